//! Process-wide relay state

use serde::Serialize;

use crate::registry::ConnectionRegistry;
use crate::room_table::RoomTable;

/// Shared state of one relay instance: the room table and the registry
///
/// Built once at startup and shared by every connection task.
#[derive(Default)]
pub struct SignalState {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rooms: RoomTable,
}

/// Point-in-time counters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub rooms: usize,
    pub connections: usize,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    pub fn stats(&self) -> Stats {
        Stats {
            rooms: self.rooms.len(),
            connections: self.registry.len(),
        }
    }
}
