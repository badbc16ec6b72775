use thiserror::Error;

/// Failure to turn expression text into an AST.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("{message} at offset {offset}")]
    Lex { message: String, offset: usize },
    #[error("{message} at offset {offset}")]
    Parse { message: String, offset: usize },
}

impl SyntaxError {
    pub(crate) fn lex(message: impl Into<String>, offset: usize) -> Self {
        Self::Lex {
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn parse(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lex { message, .. } | Self::Parse { message, .. } => message,
        }
    }

    /// Byte offset into the expression text.
    pub fn offset(&self) -> usize {
        match self {
            Self::Lex { offset, .. } | Self::Parse { offset, .. } => *offset,
        }
    }

    pub fn is_lex(&self) -> bool {
        matches!(self, Self::Lex { .. })
    }
}
