//! Dispatch error taxonomy.

use thiserror::Error;

use mediary_core::DomainError;

pub type MediatorResult<T> = Result<T, MediatorError>;

/// Error returned by `send`, `publish` and everything that runs inside them.
///
/// Behaviors never swallow an inner error; a variant produced deep in a
/// cascade (e.g. `PersistenceFailed` from a nested save) reaches the caller
/// of the outermost `send` unchanged.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// Zero or more than one handler is registered for the request type.
    #[error("no unique handler for request `{request}` ({registered} registered)")]
    NoHandlerFound {
        request: &'static str,
        registered: usize,
    },

    /// A request or notification handler reported a domain failure.
    #[error("handler failed: {0}")]
    HandlerFailed(#[from] DomainError),

    /// Cooperative cancellation was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// The underlying store rejected the write.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A behavior replaced the response with a value of another type.
    #[error("response of `{request}` has an unexpected type")]
    ResponseTypeMismatch { request: &'static str },

    /// A payload reached a handler registered for another type.
    #[error("expected `{expected}`, found `{found}`")]
    PayloadMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl MediatorError {
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PersistenceFailed(Box::new(err))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
