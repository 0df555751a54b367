use thiserror::Error;

use crate::resource::BoxError;

/// Errors returned by [`Coordinator`](crate::Coordinator) operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Shutdown has already begun; no new work or resources are accepted.
    #[error("coordinator is shutting down")]
    ShuttingDown,
    /// A signal handler could not be bound.
    #[error("failed to bind signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

/// A registered resource failed to release.
///
/// Delivered to the error sink, never returned from shutdown.
#[derive(Debug, Error)]
#[error("failed to release {resource}: {source}")]
pub struct ReleaseError {
    /// Name reported by the resource.
    pub resource: String,
    /// Failure returned by the resource.
    #[source]
    pub source: BoxError,
}
