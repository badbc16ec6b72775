use std::sync::Arc;

use kestrel_config::EvaluationConfig;
use kestrel_remote::{RemoteVm, ThreadId};

use crate::breakpoints::{BreakpointId, BreakpointRegistry, HitNotification};
use crate::error::{EvalError, ExpressionError};
use crate::eval::{Evaluator, FrameContext};
use crate::invocation::ThreadLocks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitDecision {
    Stop { breakpoint: BreakpointId },
    Continue,
    /// Logpoint output; execution continues.
    Log {
        breakpoint: BreakpointId,
        message: String,
    },
}

impl HitDecision {
    pub fn should_stop(&self) -> bool {
        matches!(self, HitDecision::Stop { .. })
    }
}

/// Decides whether a raw breakpoint hit actually pauses the target.
pub struct ConditionGate {
    vm: Arc<dyn RemoteVm>,
    registry: Arc<BreakpointRegistry>,
    locks: Arc<ThreadLocks>,
    config: EvaluationConfig,
}

impl ConditionGate {
    pub fn new(
        vm: Arc<dyn RemoteVm>,
        registry: Arc<BreakpointRegistry>,
        locks: Arc<ThreadLocks>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            vm,
            registry,
            locks,
            config,
        }
    }

    pub fn should_stop(&self, hit: HitNotification) -> bool {
        self.decide(hit).should_stop()
    }

    pub fn decide(&self, hit: HitNotification) -> HitDecision {
        let Some(breakpoint) = self.registry.record_hit(hit.request_id) else {
            tracing::debug!(target: "kestrel.gate", request = hit.request_id, "hit for unknown request");
            return HitDecision::Continue;
        };
        let id = breakpoint.id;
        if !breakpoint.enabled {
            return HitDecision::Continue;
        }
        if let Some(hit_condition) = breakpoint.hit_condition {
            if !hit_condition.matches(breakpoint.hit_count) {
                return HitDecision::Continue;
            }
        }

        if let Some(condition) = &breakpoint.condition {
            let outcome = self.on_top_frame(hit.thread, |evaluator| {
                let value = evaluator.evaluate_text(condition)?;
                Ok(evaluator.unboxed(value)?)
            });
            match outcome {
                Ok(value) if !value.is_truthy() => return HitDecision::Continue,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        target: "kestrel.gate",
                        breakpoint = id,
                        condition = %condition,
                        error = %err,
                        "condition failed to evaluate; stopping"
                    );
                    return HitDecision::Stop { breakpoint: id };
                }
            }
        }

        if let Some(message) = &breakpoint.log_message {
            let message = self.render_log_message(hit.thread, message);
            tracing::info!(target: "kestrel.logpoint", breakpoint = id, "{message}");
            return HitDecision::Log {
                breakpoint: id,
                message,
            };
        }

        HitDecision::Stop { breakpoint: id }
    }

    /// Logpoint messages are string-template bodies: `x = $x, sum = ${a + b}`.
    fn render_log_message(&self, thread: ThreadId, message: &str) -> String {
        let literal = template_literal(message);
        let rendered = self.on_top_frame(thread, |evaluator| {
            evaluator
                .evaluate_text(&literal)
                .map(|value| evaluator.display_text(&value))
        });
        rendered.unwrap_or_else(|err| err.display())
    }

    fn on_top_frame<R>(
        &self,
        thread: ThreadId,
        f: impl FnOnce(&Evaluator<'_>) -> Result<R, ExpressionError>,
    ) -> Result<R, ExpressionError> {
        self.locks.with_thread(thread, || {
            let frame = FrameContext::top_of(self.vm.as_ref(), thread)
                .map_err(EvalError::from)?
                .ok_or_else(|| EvalError::Unsupported(format!("thread {thread} has no frames")))?;
            let evaluator = Evaluator::new(self.vm.as_ref(), frame, &self.config);
            f(&evaluator)
        })
    }
}

/// Quote raw text as a string literal, leaving `$` live for interpolation.
fn template_literal(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 2);
    out.push('"');
    for ch in message.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
