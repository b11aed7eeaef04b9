//! Registry error types.

use convoy_protocol::{TaskId, TaskStatus};

use crate::destination::TransportError;

/// Errors produced by [`UploadRegistry::request_upload`](crate::UploadRegistry::request_upload).
///
/// Registration failures are synchronous and leave the registry untouched.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("expected a non-empty source locator")]
    InvalidLocator,

    #[error("could not classify a content type for '{locator}'")]
    Unclassifiable { locator: String },

    #[error("content type '{content_type}' is not in the allowed set")]
    UnsupportedContentType { content_type: String },
}

/// Errors delivered through an upload attempt's [`Completion`](crate::Completion).
///
/// `UnknownTask` and `InvalidState` refuse the attempt without touching the
/// registry; `Transmission` always pairs with an `Error` status transition
/// carrying the same cause.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unknown task '{0}'")]
    UnknownTask(TaskId),

    #[error("task is {0}, which is not a state an upload can start from")]
    InvalidState(TaskStatus),

    #[error("transmission failed: {0}")]
    Transmission(#[from] TransportError),

    #[error("upload attempt was interrupted before completion")]
    Interrupted,
}

/// Errors produced by an [`UploadScope`](crate::UploadScope).
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("no upload registry is in scope; pass one via UploadScope::provide")]
    ProviderMissing,

    #[error(transparent)]
    Register(#[from] RegisterError),
}
