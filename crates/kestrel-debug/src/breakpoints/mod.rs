//! Breakpoint definitions and their resolution against loaded types.

mod hit_condition;
mod registry;
mod source_match;

use kestrel_remote::{RequestId, ThreadId};
use serde::Serialize;

pub use hit_condition::HitCondition;
pub use registry::{BreakpointRegistry, PendingEntry};

pub type BreakpointId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodTarget {
    pub type_name: String,
    pub method_name: String,
    /// `None` attaches to every overload sharing the name.
    pub param_types: Option<Vec<String>>,
}

impl MethodTarget {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            param_types: None,
        }
    }

    pub fn with_signature<I, S>(mut self, param_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_types = Some(param_types.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BreakpointKind {
    Line { file: String, line: u32 },
    Method(MethodTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionState {
    /// No loaded type matched yet; future loads are checked.
    Pending,
    /// Attached to some matching types while others may still load.
    PartiallyResolved,
    Resolved,
}

/// What a caller asks for. Condition text is bound here and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub kind: BreakpointKind,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
    pub enabled: bool,
}

impl BreakpointSpec {
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self::new(BreakpointKind::Line {
            file: file.into(),
            line,
        })
    }

    pub fn method(target: MethodTarget) -> Self {
        Self::new(BreakpointKind::Method(target))
    }

    fn new(kind: BreakpointKind) -> Self {
        Self {
            kind,
            condition: None,
            hit_condition: None,
            log_message: None,
            enabled: true,
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn hit_condition(mut self, hit_condition: impl Into<String>) -> Self {
        self.hit_condition = Some(hit_condition.into());
        self
    }

    pub fn log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Snapshot of a registered breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointDescriptor {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub enabled: bool,
    pub condition: Option<String>,
    #[serde(serialize_with = "serialize_hit_condition")]
    pub hit_condition: Option<HitCondition>,
    pub log_message: Option<String>,
    pub requests: Vec<RequestId>,
    pub state: ResolutionState,
    pub hit_count: u64,
}

impl BreakpointDescriptor {
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }
}

fn serialize_hit_condition<S>(value: &Option<HitCondition>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(condition) => serializer.serialize_some(&condition.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Raw hit notification as the gate sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitNotification {
    pub request_id: RequestId,
    pub thread: ThreadId,
}
