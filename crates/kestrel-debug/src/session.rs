use std::sync::Arc;

use kestrel_config::DebuggerConfig;
use kestrel_expr::parse_expression;
use kestrel_remote::{ObjectId, RemoteError, RemoteVm, ThreadId, TypeId, VmEvent};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::breakpoints::{
    BreakpointDescriptor, BreakpointId, BreakpointRegistry, BreakpointSpec, HitNotification,
    MethodTarget,
};
use crate::error::{DebugError, DebugResult, EvalError, ExpressionError};
use crate::eval::{Evaluator, FrameContext, Value};
use crate::gate::{ConditionGate, HitDecision};
use crate::invocation::ThreadLocks;
use crate::object_registry::{ObjectHandle, ObjectRegistry};
use crate::watcher::ClassLoadWatcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub display_value: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expandable_handle: Option<ObjectHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum StopReason {
    Breakpoint { breakpoint: BreakpointId },
    Step,
    Exception { exception: ObjectId, caught: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    Stopped { thread: ThreadId, reason: StopReason },
    Output { text: String },
    Terminated,
}

/// One debugging session against one target.
pub struct DebugSession {
    vm: Arc<dyn RemoteVm>,
    config: DebuggerConfig,
    registry: Arc<BreakpointRegistry>,
    watcher: ClassLoadWatcher,
    gate: ConditionGate,
    locks: Arc<ThreadLocks>,
    objects: Mutex<ObjectRegistry>,
}

impl DebugSession {
    pub fn new(vm: Arc<dyn RemoteVm>, config: DebuggerConfig) -> Self {
        let registry = Arc::new(BreakpointRegistry::new(
            vm.clone(),
            config.breakpoints.clone(),
        ));
        let locks = Arc::new(ThreadLocks::new());
        let watcher = ClassLoadWatcher::new(vm.clone(), registry.clone());
        let gate = ConditionGate::new(
            vm.clone(),
            registry.clone(),
            locks.clone(),
            config.evaluation.clone(),
        );
        let objects = Mutex::new(ObjectRegistry::with_max_unpinned(
            config.evaluation.max_object_handles,
        ));
        Self {
            vm,
            config,
            registry,
            watcher,
            gate,
            locks,
            objects,
        }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BreakpointRegistry> {
        &self.registry
    }

    pub fn top_frame(&self, thread: ThreadId) -> DebugResult<FrameContext> {
        FrameContext::top_of(self.vm.as_ref(), thread)?.ok_or(DebugError::NoFrames(thread))
    }

    /// Evaluate `text` on `frame`; failures come back as an `Error: ...` display.
    pub fn evaluate(&self, text: &str, frame: FrameContext) -> EvaluateResult {
        self.try_evaluate(text, frame)
            .unwrap_or_else(|err| EvaluateResult {
                display_value: err.display(),
                type_name: String::new(),
                expandable_handle: None,
            })
    }

    pub fn try_evaluate(
        &self,
        text: &str,
        frame: FrameContext,
    ) -> Result<EvaluateResult, ExpressionError> {
        let expr = parse_expression(text)?;
        self.locks.with_thread(frame.thread, || {
            let evaluator = Evaluator::new(self.vm.as_ref(), frame, &self.config.evaluation);
            let value = evaluator.evaluate(&expr).inspect_err(|err| {
                if let EvalError::Remote(RemoteError::InvalidObject(object)) = err {
                    self.objects.lock().mark_invalid(*object);
                }
            })?;

            let display_value = evaluator.display(&value);
            let type_name = evaluator.type_name_of(&value);
            let expandable_handle = match value {
                Value::Object(id) | Value::Array(id) => {
                    Some(self.objects.lock().track(id, &type_name))
                }
                _ => None,
            };
            Ok(EvaluateResult {
                display_value,
                type_name,
                expandable_handle,
            })
        })
    }

    pub fn object_for_handle(&self, handle: ObjectHandle) -> Option<ObjectId> {
        let objects = self.objects.lock();
        if objects.is_invalid(handle) {
            return None;
        }
        objects.object_id(handle)
    }

    /// Keep `handle` alive across resumes.
    pub fn pin(&self, handle: ObjectHandle) {
        self.objects.lock().pin(handle);
    }

    pub fn unpin(&self, handle: ObjectHandle) {
        self.objects.lock().unpin(handle);
    }

    pub fn add_line_breakpoint(
        &self,
        file: &str,
        line: u32,
        condition: Option<&str>,
    ) -> DebugResult<BreakpointDescriptor> {
        let mut spec = BreakpointSpec::line(file, line);
        spec.condition = condition.map(str::to_string);
        self.add_breakpoint(spec)
    }

    pub fn add_method_breakpoint(
        &self,
        type_name: &str,
        method_name: &str,
        condition: Option<&str>,
    ) -> DebugResult<BreakpointDescriptor> {
        let mut spec = BreakpointSpec::method(MethodTarget::new(type_name, method_name));
        spec.condition = condition.map(str::to_string);
        self.add_breakpoint(spec)
    }

    pub fn add_breakpoint(&self, spec: BreakpointSpec) -> DebugResult<BreakpointDescriptor> {
        self.watcher.ensure_subscribed()?;
        self.registry.register(spec)
    }

    pub fn remove_breakpoint(&self, id: BreakpointId) -> bool {
        self.registry.remove(id)
    }

    pub fn set_breakpoint_enabled(&self, id: BreakpointId, enabled: bool) -> DebugResult<()> {
        self.registry.set_enabled(id, enabled)
    }

    pub fn breakpoints(&self) -> Vec<BreakpointDescriptor> {
        self.registry.breakpoints()
    }

    pub fn on_type_loaded(&self, type_id: TypeId) -> Vec<BreakpointId> {
        self.watcher.on_type_loaded(type_id)
    }

    pub fn should_stop(&self, hit: HitNotification) -> bool {
        self.gate.should_stop(hit)
    }

    /// Let `thread` run again on the user's behalf. Unpinned object handles
    /// do not survive this.
    pub fn resume(&self, thread: ThreadId) -> DebugResult<()> {
        self.objects.lock().clear_unpinned();
        self.locks.prune();
        self.vm.resume_thread(thread)?;
        Ok(())
    }

    /// Handle one notification to completion. Blocks on remote calls.
    pub fn handle_event(&self, event: &VmEvent) -> Vec<SessionEvent> {
        match event {
            VmEvent::TypeLoaded { type_id } => {
                self.on_type_loaded(*type_id);
                Vec::new()
            }
            VmEvent::BreakpointHit {
                request_id, thread, ..
            } => {
                let hit = HitNotification {
                    request_id: *request_id,
                    thread: *thread,
                };
                match self.gate.decide(hit) {
                    HitDecision::Stop { breakpoint } => vec![SessionEvent::Stopped {
                        thread: *thread,
                        reason: StopReason::Breakpoint { breakpoint },
                    }],
                    HitDecision::Continue => {
                        self.resume_quietly(*thread);
                        Vec::new()
                    }
                    HitDecision::Log { message, .. } => {
                        self.resume_quietly(*thread);
                        vec![SessionEvent::Output { text: message }]
                    }
                }
            }
            VmEvent::StepCompleted { thread, .. } => vec![SessionEvent::Stopped {
                thread: *thread,
                reason: StopReason::Step,
            }],
            VmEvent::ExceptionThrown {
                thread,
                exception,
                caught,
                ..
            } => vec![SessionEvent::Stopped {
                thread: *thread,
                reason: StopReason::Exception {
                    exception: *exception,
                    caught: *caught,
                },
            }],
            VmEvent::Terminated => {
                self.registry.clear();
                self.objects.lock().clear_unpinned();
                vec![SessionEvent::Terminated]
            }
        }
    }

    /// Let a thread the gate did not stop run again. Handles stay: other
    /// threads may still be stopped and under inspection.
    fn resume_quietly(&self, thread: ThreadId) {
        self.locks.prune();
        if let Err(err) = self.vm.resume_thread(thread) {
            tracing::warn!(target: "kestrel.session", thread, error = %err, "failed to resume thread");
        }
    }

    /// Subscribe to target events and drive them on a background task.
    ///
    /// The subscription happens before this returns, so nothing emitted after
    /// the call is missed.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> (
        tokio::task::JoinHandle<()>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let events = self.vm.subscribe_events();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run_events(events, cancel, tx));
        (task, rx)
    }

    /// Consume target notifications one at a time until the target terminates,
    /// `cancel` fires, or nobody listens to `out` anymore.
    pub async fn run_events(
        self: Arc<Self>,
        mut events: broadcast::Receiver<VmEvent>,
        cancel: CancellationToken,
        out: mpsc::UnboundedSender<SessionEvent>,
    ) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(target: "kestrel.session", "event loop cancelled");
                    return;
                }
                received = events.recv() => received,
            };

            let event = match received {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "kestrel.session", skipped, "event stream lagged; rescanning loaded types");
                    let session = self.clone();
                    if let Err(err) = tokio::task::spawn_blocking(move || session.watcher.rescan()).await {
                        tracing::warn!(target: "kestrel.session", error = %err, "rescan task failed");
                    }
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = out.send(SessionEvent::Terminated);
                    return;
                }
            };

            let terminated = matches!(event, VmEvent::Terminated);
            let session = self.clone();
            let emitted =
                match tokio::task::spawn_blocking(move || session.handle_event(&event)).await {
                    Ok(emitted) => emitted,
                    Err(err) => {
                        tracing::warn!(target: "kestrel.session", error = %err, "event handler failed");
                        continue;
                    }
                };

            for event in emitted {
                if out.send(event).is_err() {
                    tracing::debug!(target: "kestrel.session", "event receiver dropped");
                    return;
                }
            }

            if terminated {
                tracing::info!(target: "kestrel.session", "target terminated");
                self.watcher.unsubscribe();
                return;
            }
        }
    }
}
