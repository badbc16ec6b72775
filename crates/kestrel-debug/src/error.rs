use kestrel_expr::SyntaxError;
use kestrel_remote::{RemoteError, ThreadId};
use thiserror::Error;

use crate::breakpoints::BreakpointId;

pub type DebugResult<T> = Result<T, DebugError>;

/// Failure while evaluating a parsed expression against a live frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("cannot find `{0}` in this frame")]
    NameNotFound(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },
    #[error("no applicable method `{0}`")]
    MethodNotFound(String),
    #[error("`{name}` is ambiguous: {candidates}")]
    AmbiguousOverload { name: String, candidates: String },
    #[error("type name `{name}` is ambiguous: {candidates}")]
    AmbiguousType { name: String, candidates: String },
    #[error("cannot access `{0}` on null")]
    NullReceiver(String),
    #[error("remote invocation threw {0}")]
    RemoteInvocationFailed(String),
    #[error("thread {0} is not suspended")]
    NotSuspended(ThreadId),
    #[error("invalid template expression: {0}")]
    Syntax(SyntaxError),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Remote(RemoteError),
}

impl From<RemoteError> for EvalError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::InvocationFailed { exception_type } => {
                EvalError::RemoteInvocationFailed(exception_type)
            }
            RemoteError::NotSuspended(thread) => EvalError::NotSuspended(thread),
            other => EvalError::Remote(other),
        }
    }
}

/// Anything that can go wrong between expression text and a value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl ExpressionError {
    /// The form shown to the user in place of a value.
    pub fn display(&self) -> String {
        format!("Error: {self}")
    }
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),
    #[error("unknown breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),
    #[error("invalid hit condition `{0}`")]
    InvalidHitCondition(String),
    #[error("line breakpoints need a line number of at least 1")]
    InvalidLine,
    #[error("method breakpoint on {type_name}.{method_name} needs parameter types")]
    MissingSignature {
        type_name: String,
        method_name: String,
    },
    #[error("thread {0} has no frames")]
    NoFrames(ThreadId),
}
