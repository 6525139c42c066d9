//! Connection registry
//!
//! Owns every live connection: its outbound channel and the room it joined.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use duet_core::{ConnectionId, RoomId, SignalError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::messages::ServerMessage;

/// Sending half of a connection's bounded outbound queue
pub type Outbox = mpsc::Sender<ServerMessage>;

struct Connection {
    room: Option<RoomId>,
    outbox: Outbox,
}

/// Live connections by identifier
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with no room membership
    pub fn register(&self, id: ConnectionId, outbox: Outbox) -> Result<(), SignalError> {
        match self.connections.entry(id) {
            Entry::Occupied(entry) => Err(SignalError::DuplicateConnection(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Connection { room: None, outbox });
                Ok(())
            }
        }
    }

    /// Point a connection at a room (or none)
    pub fn set_room(&self, id: &ConnectionId, room: Option<RoomId>) -> Result<(), SignalError> {
        let mut conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| SignalError::UnknownConnection(id.clone()))?;
        conn.room = room;
        Ok(())
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<RoomId> {
        self.connections.get(id).and_then(|conn| conn.room.clone())
    }

    /// Delete a connection, returning the room it was in
    ///
    /// Unknown identifiers are ignored; disconnect paths may race.
    pub fn remove(&self, id: &ConnectionId) -> Option<RoomId> {
        self.connections.remove(id).and_then(|(_, conn)| conn.room)
    }

    /// Queue a message for a connection without waiting
    ///
    /// Returns `false` if the connection is gone, its writer has stopped, or
    /// its queue is full because the client stopped reading.
    pub fn send(&self, id: &ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(id) {
            Some(conn) => match conn.outbox.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Outbox of {} is full", id);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            None => {
                trace!("Send to unknown connection {}", id);
                false
            }
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    #[test]
    fn test_register_duplicate() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(16);

        registry.register(conn("a"), tx.clone()).unwrap();
        assert_eq!(
            registry.register(conn("a"), tx),
            Err(SignalError::DuplicateConnection(conn("a")))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.room_of(&conn("a")), None);
    }

    #[test]
    fn test_set_room() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(16);
        registry.register(conn("a"), tx).unwrap();

        registry.set_room(&conn("a"), Some("r1".into())).unwrap();
        assert_eq!(registry.room_of(&conn("a")), Some(RoomId::from("r1")));

        registry.set_room(&conn("a"), None).unwrap();
        assert_eq!(registry.room_of(&conn("a")), None);

        assert_eq!(
            registry.set_room(&conn("b"), Some("r1".into())),
            Err(SignalError::UnknownConnection(conn("b")))
        );
    }

    #[test]
    fn test_remove_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(16);
        registry.register(conn("a"), tx).unwrap();
        registry.set_room(&conn("a"), Some("r1".into())).unwrap();

        assert_eq!(registry.remove(&conn("a")), Some(RoomId::from("r1")));
        assert_eq!(registry.remove(&conn("a")), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(16);
        registry.register(conn("a"), tx).unwrap();

        assert!(registry.send(&conn("a"), ServerMessage::Pong { timestamp: 7 }));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong { timestamp: 7 });

        assert!(!registry.send(&conn("b"), ServerMessage::Pong { timestamp: 7 }));

        drop(rx);
        assert!(!registry.send(&conn("a"), ServerMessage::Pong { timestamp: 8 }));
    }

    #[test]
    fn test_send_to_stalled_reader() {
        let registry = ConnectionRegistry::new();
        // Receiver kept alive but never drained
        let (tx, _rx) = mpsc::channel(2);
        registry.register(conn("a"), tx).unwrap();

        assert!(registry.send(&conn("a"), ServerMessage::Pong { timestamp: 1 }));
        assert!(registry.send(&conn("a"), ServerMessage::Pong { timestamp: 2 }));
        assert!(!registry.send(&conn("a"), ServerMessage::Pong { timestamp: 3 }));
    }
}
