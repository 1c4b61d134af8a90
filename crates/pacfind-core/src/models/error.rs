use thiserror::Error;

use crate::models::SourceTag;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    SourceUnavailable,
    ParseFailure,
    InvalidInput,
    Cancelled,
    ProcessFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub origin: Option<SourceTag>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            origin: None,
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(CoreErrorKind::Cancelled, "operation cancelled")
    }

    /// Attributes the error to a source unless it already carries one.
    pub fn with_origin(mut self, origin: SourceTag) -> Self {
        if self.origin.is_none() {
            self.origin = Some(origin);
        }
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == CoreErrorKind::Cancelled
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
