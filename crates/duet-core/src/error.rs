//! Error types for the Duet relay

use thiserror::Error;

use crate::types::ConnectionId;

/// Registry and lifecycle errors.
///
/// None of these reach a client. `UnknownConnection` and
/// `DuplicateConnection` indicate a lifecycle bug and are logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}
