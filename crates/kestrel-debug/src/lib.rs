//! Debugger core: expression evaluation against a suspended target, the
//! breakpoint resolution state machine, and the gate that turns raw hits into
//! stop/continue decisions.
//!
//! Everything talks to the target through [`kestrel_remote::RemoteVm`].
//! [`DebugSession`] ties the pieces together and drives target notifications
//! from an async task.

pub mod breakpoints;
mod error;
pub mod eval;
mod gate;
mod invocation;
mod object_registry;
mod session;
mod watcher;

pub use breakpoints::{
    BreakpointDescriptor, BreakpointId, BreakpointKind, BreakpointRegistry, BreakpointSpec,
    HitCondition, HitNotification, MethodTarget, PendingEntry, ResolutionState,
};
pub use error::{DebugError, DebugResult, EvalError, ExpressionError};
pub use eval::{Evaluator, FrameContext, RangeValue, StringValue, Value};
pub use gate::{ConditionGate, HitDecision};
pub use invocation::ThreadLocks;
pub use object_registry::{ObjectHandle, ObjectRegistry};
pub use session::{DebugSession, EvaluateResult, SessionEvent, StopReason};
pub use watcher::ClassLoadWatcher;
