//! Duet Core - Shared identifiers, configuration and error types
//!
//! This crate contains the foundational types used by the Duet relay.
//! It has no dependencies on networking code.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LogConfig, SignalConfig};
pub use error::*;
pub use types::*;

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 8080;

/// Members per room: one creator, one joiner
pub const ROOM_CAPACITY: usize = 2;
