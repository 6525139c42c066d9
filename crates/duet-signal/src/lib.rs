//! Duet Signal Server
//!
//! Real-time signaling relay for two-party peer sessions. Clients connect
//! over WebSocket, pair up in named rooms, and exchange opaque negotiation
//! payloads through the relay until they can talk directly.
//!
//! # Protocol
//!
//! 1. First client sends `create-or-join` and receives `created`
//! 2. Second client sends the same room and receives `joined`
//! 3. Any further client receives `full`
//! 4. `offer`, `answer` and `ice-candidate` are forwarded to the other member
//! 5. On disconnect the member is removed; empty rooms are deleted

pub mod lifecycle;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod room;
pub mod room_table;
pub mod server;
pub mod state;

pub use messages::{ClientMessage, ServerMessage, SignalKind};
pub use registry::{ConnectionRegistry, Outbox};
pub use relay::{create_or_join, dispatch, forward, Dispatch};
pub use room::{JoinOutcome, Phase, RoomState};
pub use room_table::RoomTable;
pub use server::SignalServer;
pub use state::{SignalState, Stats};
