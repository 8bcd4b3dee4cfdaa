//! Error taxonomy shared by every autogate crate.
//!
//! The variants are grouped by who is expected to react to them:
//!
//! | Variant | Raised by | Caller reaction |
//! |---------|-----------|-----------------|
//! | [`Error::QueueFull`] | request queues, channels | back off and retry later |
//! | [`Error::InvalidArgument`] | request validation | fix the request |
//! | [`Error::TransientDeviceFault`] | device drivers | normally absorbed by a retry policy |
//! | [`Error::FatalDeviceFault`] | retry policy, drivers | report failure |
//! | [`Error::Closed`] | channels, queues, generators | stop using the handle |
//! | [`Error::Timeout`] | bounded joins | report failure |
//!
//! [`Error::status_code`] maps each variant onto the status the API layer
//! returns, so backpressure (`429`) is never confused with bad input (`400`).

use std::error::Error as StdError;

/// Boxed error used as the source of device faults.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bounded queue had no free slot and the caller asked not to wait.
    #[error("{queue} queue is full")]
    QueueFull { queue: String },

    /// The caller handed over a value the receiver refuses to accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A device error known to be recoverable by retrying or reinitializing.
    #[error("Transient device fault: {source}")]
    TransientDeviceFault {
        #[source]
        source: BoxError,
    },

    /// Retry budget exhausted or an error outside the transient set.
    #[error("Device fault after {attempts} attempt(s): {source}")]
    FatalDeviceFault {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// The channel, queue or generator was already closed.
    #[error("{0} is closed")]
    Closed(String),

    /// A bounded wait expired.
    #[error("Timed out after {duration_ms}ms waiting for {what}")]
    Timeout { what: String, duration_ms: u64 },

    /// A background worker panicked or was torn down unexpectedly.
    #[error("Background worker failed: {0}")]
    Worker(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn queue_full(queue: impl Into<String>) -> Self {
        Self::QueueFull {
            queue: queue.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn transient(source: impl Into<BoxError>) -> Self {
        Self::TransientDeviceFault {
            source: source.into(),
        }
    }

    pub fn fatal(attempts: u32, source: impl Into<BoxError>) -> Self {
        Self::FatalDeviceFault {
            attempts,
            source: source.into(),
        }
    }

    pub fn closed(what: impl Into<String>) -> Self {
        Self::Closed(what.into())
    }

    pub fn timeout(what: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            duration_ms: duration.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// HTTP-equivalent status the API layer reports for this error.
    ///
    /// ```
    /// use autogate_core::Error;
    ///
    /// assert_eq!(Error::queue_full("buzzer").status_code(), 429);
    /// assert_eq!(Error::invalid_argument("duration").status_code(), 400);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self {
            Self::QueueFull { .. } => 429,
            Self::InvalidArgument(_) => 400,
            Self::TransientDeviceFault { .. } | Self::Closed(_) => 503,
            Self::Timeout { .. } => 504,
            Self::FatalDeviceFault { .. }
            | Self::Worker(_)
            | Self::Config(_)
            | Self::Io(_) => 500,
        }
    }

    /// Whether the same request may succeed if the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::TransientDeviceFault { .. } | Self::Timeout { .. }
        )
    }
}

/// Classification of device errors into transient and fatal faults.
///
/// Implemented by driver-level error types so the retry policy can decide
/// whether an attempt is worth repeating.
pub trait TransientFault {
    fn is_transient(&self) -> bool;
}

impl TransientFault for Error {
    fn is_transient(&self) -> bool {
        matches!(self, Self::TransientDeviceFault { .. })
    }
}
