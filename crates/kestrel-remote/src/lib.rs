//! Remote introspection interface for the Kestrel debugger core.
//!
//! The debugger never owns the data it inspects. Everything it knows about the
//! target process (loaded types, objects, threads, frames) is reached through
//! the [`RemoteVm`] trait using opaque ids. Any of those ids can go stale at any
//! moment (the object is collected, the thread resumes, the process exits), so
//! every call returns a [`Result`] and callers are expected to degrade instead
//! of panicking.

use thiserror::Error;
use tokio::sync::broadcast;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{InvocationRecord, MockBehavior, MockFrame, MockMethod, MockRequest, MockType, MockVm};

pub type TypeId = u64;
pub type ObjectId = u64;
pub type ThreadId = u64;
pub type FrameId = u64;
pub type MethodId = u64;
pub type RequestId = u32;

/// A code position inside a loaded type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub type_id: TypeId,
    pub method_id: MethodId,
    pub line: u32,
    pub index: u64,
}

/// A value as the target process sees it.
///
/// Strings, arrays and objects are handles into the remote heap, never the
/// data itself.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteValue {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(ObjectId),
    Array(ObjectId),
    Object(ObjectId),
}

impl RemoteValue {
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::String(id) | Self::Array(id) | Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub id: MethodId,
    pub name: String,
    /// Argument type names in declaration order (`int`, `java.lang.String`, ...).
    pub param_types: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub type_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub id: FrameId,
    pub location: Location,
}

/// Receiver of a remote method invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeTarget {
    Instance(ObjectId),
    Static(TypeId),
}

/// Lifecycle notifications delivered by the target process.
#[derive(Clone, Debug, PartialEq)]
pub enum VmEvent {
    TypeLoaded {
        type_id: TypeId,
    },
    BreakpointHit {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
    },
    StepCompleted {
        thread: ThreadId,
        location: Location,
    },
    ExceptionThrown {
        thread: ThreadId,
        exception: ObjectId,
        location: Location,
        caught: bool,
    },
    Terminated,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("target process is disconnected")]
    Disconnected,
    #[error("invalid object id {0} (collected?)")]
    InvalidObject(ObjectId),
    #[error("invalid type id {0}")]
    InvalidType(TypeId),
    #[error("invalid thread id {0}")]
    InvalidThread(ThreadId),
    #[error("frame {frame} is no longer valid on thread {thread}")]
    InvalidFrame { thread: ThreadId, frame: FrameId },
    #[error("unknown event request {0}")]
    InvalidRequest(RequestId),
    #[error("unknown method id {0}")]
    InvalidMethod(MethodId),
    #[error("array index {index} out of range for length {length}")]
    InvalidIndex { index: usize, length: usize },
    #[error("thread {0} is not suspended")]
    NotSuspended(ThreadId),
    #[error("invocation threw {exception_type}")]
    InvocationFailed { exception_type: String },
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Whether this error means a handle outlived its remote counterpart.
    pub fn is_stale_handle(&self) -> bool {
        matches!(
            self,
            Self::InvalidObject(_)
                | Self::InvalidType(_)
                | Self::InvalidThread(_)
                | Self::InvalidFrame { .. }
                | Self::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Boundary API through which the core inspects a live, separate process.
///
/// Implementations must be callable from several threads at once: breakpoint
/// registration runs on the caller's thread while type-load notifications are
/// handled on the event thread. Invocations block until the target thread
/// finishes the call; no timeout is applied at this layer.
pub trait RemoteVm: Send + Sync {
    /// All loaded types, or only those with the exact given name.
    fn list_loaded_types(&self, name: Option<&str>) -> Result<Vec<TypeId>>;
    fn type_name(&self, type_id: TypeId) -> Result<String>;
    fn type_source_file(&self, type_id: TypeId) -> Result<Option<String>>;
    fn superclass(&self, type_id: TypeId) -> Result<Option<TypeId>>;
    fn interfaces(&self, type_id: TypeId) -> Result<Vec<TypeId>>;

    /// Executable locations on `line`; empty when the type has no code there.
    fn locations_for_line(&self, type_id: TypeId, line: u32) -> Result<Vec<Location>>;
    /// Visible methods with the given name, own declarations first.
    fn methods_by_name(&self, type_id: TypeId, name: &str) -> Result<Vec<MethodInfo>>;
    fn method_entry_location(&self, type_id: TypeId, method_id: MethodId)
        -> Result<Option<Location>>;

    fn create_location_breakpoint(&self, location: Location) -> Result<RequestId>;
    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> Result<()>;
    fn delete_request(&self, request: RequestId) -> Result<()>;

    /// Ask the target to report type loads matching `filter` (`*` for all).
    fn subscribe_type_load(&self, filter: &str) -> Result<RequestId>;
    fn subscribe_events(&self) -> broadcast::Receiver<VmEvent>;

    fn thread_is_suspended(&self, thread: ThreadId) -> Result<bool>;
    fn resume_thread(&self, thread: ThreadId) -> Result<()>;
    fn frames(&self, thread: ThreadId) -> Result<Vec<FrameInfo>>;

    fn frame_this(&self, thread: ThreadId, frame: FrameId) -> Result<Option<ObjectId>>;
    fn visible_variables(&self, thread: ThreadId, frame: FrameId) -> Result<Vec<VariableInfo>>;
    fn variable_value(&self, thread: ThreadId, frame: FrameId, name: &str) -> Result<RemoteValue>;
    fn frame_declaring_type(&self, thread: ThreadId, frame: FrameId) -> Result<TypeId>;

    fn object_type(&self, object: ObjectId) -> Result<TypeId>;
    /// `Ok(None)` when the object's type has no field with that name.
    fn get_field(&self, object: ObjectId, name: &str) -> Result<Option<RemoteValue>>;
    fn set_field(&self, object: ObjectId, name: &str, value: RemoteValue) -> Result<()>;
    fn get_static_field(&self, type_id: TypeId, name: &str) -> Result<Option<RemoteValue>>;

    fn array_length(&self, array: ObjectId) -> Result<usize>;
    fn get_array_element(&self, array: ObjectId, index: usize) -> Result<RemoteValue>;
    fn set_array_element(&self, array: ObjectId, index: usize, value: RemoteValue) -> Result<()>;

    fn string_value(&self, string: ObjectId) -> Result<String>;
    /// Create a string in the target so it can be passed to remote code.
    fn wrap_local_string(&self, text: &str) -> Result<ObjectId>;

    fn invoke_method(
        &self,
        thread: ThreadId,
        target: InvokeTarget,
        method: MethodId,
        args: &[RemoteValue],
    ) -> Result<RemoteValue>;
    fn new_instance(
        &self,
        thread: ThreadId,
        type_id: TypeId,
        constructor: MethodId,
        args: &[RemoteValue],
    ) -> Result<RemoteValue>;
}
