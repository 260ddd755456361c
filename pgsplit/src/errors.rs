use std::time::Duration;
use thiserror::Error as ThisError;

/// Unified error type for connection manager operations.
///
/// Replica-side failures are deliberately absent: they are absorbed where the
/// replica is touched and only change routing, they never reach the caller.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Primary configuration is missing required fields
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// The primary backend could not be reached at connect or probe time
    #[error("Primary database unreachable")]
    Connection(#[source] sqlx::Error),

    /// `connect()` was called while the manager is connected or a connect is in flight
    #[error("Already connected")]
    AlreadyConnected,

    /// A session was requested before `connect()` succeeded or after `disconnect()`
    #[error("Database not connected")]
    NotConnected,

    /// Pool checkout could not be satisfied within the configured timeout
    #[error("Connection checkout timed out after {timeout:?}")]
    PoolTimeout { timeout: Duration },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type alias for connection manager results
pub type Result<T> = std::result::Result<T, Error>;
