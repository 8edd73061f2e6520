//! Error types for pool operations
use thiserror::Error;

/// Boxed error returned by [`Resource`](crate::Resource) collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to pool callers.
///
/// Failures of `check`, `validate` and `destroy` never show up here: the pool
/// turns them into silent retirement (and a log line). Looking up a client
/// that is not live is reported as `false` by
/// [`Pool::release`](crate::Pool::release) and
/// [`Pool::remove`](crate::Pool::remove), not as an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Shutdown has been requested; new work is rejected.
    #[error("Pool '{pool}' is shutting down")]
    PoolClosing {
        /// The pool name
        pool: String,
    },

    /// Shutdown has completed.
    #[error("Pool '{pool}' has been closed")]
    PoolClosed {
        /// The pool name
        pool: String,
    },

    /// The `create` collaborator failed for this acquisition attempt.
    #[error("Failed to create resource for pool '{pool}': {source}")]
    CreateFailed {
        /// The pool name
        pool: String,
        /// The error reported by the collaborator, untouched
        #[source]
        source: BoxError,
    },

    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    InvalidConfig {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn closing(pool: &str) -> Self {
        Self::PoolClosing {
            pool: pool.to_owned(),
        }
    }

    pub(crate) fn closed(pool: &str) -> Self {
        Self::PoolClosed {
            pool: pool.to_owned(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only a failed creation is worth retrying: the pool itself is still
    /// usable. Closing/closed pools never accept work again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreateFailed { .. })
    }

    /// Whether the error means the pool no longer accepts work.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::PoolClosing { .. } | Self::PoolClosed { .. })
    }

    /// Get the pool name associated with this error (if any)
    #[must_use]
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::InvalidConfig { .. } => None,
            Self::PoolClosing { pool }
            | Self::PoolClosed { pool }
            | Self::CreateFailed { pool, .. } => Some(pool),
        }
    }
}
