//! Error types for the broker layer.

use portlink_types::Rights;
use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur in broker operations.
///
/// A failed operation performs no side effect: no state change, no event.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The caller's rights mask lacks a required bit.
    #[error("unauthorized: missing rights {missing}")]
    Unauthorized {
        /// The bits the caller did not hold.
        missing: Rights,
    },

    /// The named port is not registered (or has the wrong kind).
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// The named connection does not exist.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// A port with the same (module, port) identity is already registered.
    #[error("duplicate port: {0}")]
    DuplicatePort(String),

    /// The connection pair already exists.
    #[error("connection already exists: {0}")]
    AlreadyExists(String),

    /// The port's connection limit is reached.
    #[error("port already connected: {0}")]
    AlreadyConnected(String),

    /// Configuration or storage layer failure. Propagated, never retried.
    #[error("storage error: {0}")]
    Storage(String),
}
