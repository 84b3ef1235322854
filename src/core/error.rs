//! Error types for pool and scheduler operations.

use std::fmt;

use thiserror::Error;

use super::resource_pool::{Lease, ResourceId};

/// Errors produced by the resource pool and the task scheduler.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration validation failed (e.g. a pool size of zero).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The resource factory failed; construction was aborted.
    #[error("failed to provision resource {index}")]
    Provisioning {
        /// Index of the resource that could not be created.
        index: usize,
        /// Underlying factory error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// The lease was not issued by this pool.
    #[error("resource {0} is not owned by this pool")]
    UnknownResource(ResourceId),
    /// The resource is already in the free set.
    #[error("resource {0} is already free")]
    DoubleRelease(ResourceId),
    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,
    /// The scheduler has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// Internal failure (worker spawn failed, channel closed, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A rejected release. Hands the lease back to the caller so the resource is
/// not lost; dropping it returns the resource to the pool that issued it.
pub struct ReleaseError<R> {
    /// The lease that could not be released.
    pub lease: Lease<R>,
    /// Why the release was rejected.
    pub reason: PoolError,
}

impl<R> ReleaseError<R> {
    /// Take the lease back out of the error.
    #[must_use]
    pub fn into_lease(self) -> Lease<R> {
        self.lease
    }
}

impl<R> fmt::Debug for ReleaseError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseError")
            .field("resource", &self.lease.id())
            .field("reason", &self.reason)
            .finish()
    }
}

impl<R> fmt::Display for ReleaseError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release rejected: {}", self.reason)
    }
}

impl<R> std::error::Error for ReleaseError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

/// Application-facing result using anyhow for factories and task bodies.
pub type AppResult<T> = Result<T, anyhow::Error>;
