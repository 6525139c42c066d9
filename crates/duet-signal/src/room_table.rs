//! Room table shared by all connections
//!
//! Each mutation runs under the map entry's shard lock, so a join's capacity
//! check and membership update are one atomic step.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use duet_core::{ConnectionId, RoomId};
use tracing::debug;

use crate::messages::SignalKind;
use crate::room::{JoinOutcome, Phase, RoomState};

/// Active rooms by identifier
#[derive(Default)]
pub struct RoomTable {
    rooms: DashMap<RoomId, RoomState>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `room`, creating the room if it does not exist
    pub fn join(&self, room: &RoomId, conn: &ConnectionId) -> JoinOutcome {
        let mut state = self.rooms.entry(room.clone()).or_default();
        let (next, outcome) = std::mem::take(state.value_mut()).join(conn);
        *state.value_mut() = next;

        debug!("Join {} -> {}: {:?} ({:?})", conn, room, outcome, state.phase());
        outcome
    }

    /// Remove `conn` from `room`, deleting the room once it is empty
    pub fn leave(&self, room: &RoomId, conn: &ConnectionId) {
        if let Entry::Occupied(mut entry) = self.rooms.entry(room.clone()) {
            let next = std::mem::take(entry.get_mut()).leave(conn);
            if next.is_empty() {
                entry.remove();
                debug!("Room {} removed (empty)", room);
            } else {
                *entry.get_mut() = next;
            }
        }
    }

    /// Other current members of `room`, empty unless `conn` is a member
    pub fn peers_of(&self, room: &RoomId, conn: &ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|state| state.peers_of(conn))
            .unwrap_or_default()
    }

    /// Feed relayed traffic into the room's phase
    pub fn observe(&self, room: &RoomId, kind: SignalKind) -> Option<Phase> {
        let mut state = self.rooms.get_mut(room)?;
        let next = std::mem::take(state.value_mut()).observe(kind);
        *state.value_mut() = next;
        Some(state.phase())
    }

    pub fn phase(&self, room: &RoomId) -> Option<Phase> {
        self.rooms.get(room).map(|state| state.phase())
    }

    /// Members of `room` in join order
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|state| state.members())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::ROOM_CAPACITY;
    use std::sync::{Arc, Barrier};

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    #[test]
    fn test_join_trichotomy() {
        let table = RoomTable::new();
        let room = RoomId::from("r1");

        assert_eq!(table.join(&room, &conn("x")), JoinOutcome::Created);
        assert_eq!(table.join(&room, &conn("y")), JoinOutcome::Joined);
        assert_eq!(table.join(&room, &conn("z")), JoinOutcome::Full);

        assert_eq!(table.members(&room), vec![conn("x"), conn("y")]);
        assert_eq!(table.phase(&room), Some(Phase::Negotiating));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_leave_deletes_empty_room() {
        let table = RoomTable::new();
        let room = RoomId::from("r1");

        table.join(&room, &conn("x"));
        table.join(&room, &conn("y"));

        table.leave(&room, &conn("x"));
        assert_eq!(table.members(&room), vec![conn("y")]);
        assert!(table.peers_of(&room, &conn("y")).is_empty());

        table.leave(&room, &conn("y"));
        assert!(!table.contains(&room));
        assert!(table.is_empty());

        assert_eq!(table.join(&room, &conn("w")), JoinOutcome::Created);
    }

    #[test]
    fn test_leave_idempotent() {
        let table = RoomTable::new();
        let room = RoomId::from("r1");

        table.join(&room, &conn("x"));
        table.join(&room, &conn("y"));

        table.leave(&room, &conn("y"));
        table.leave(&room, &conn("y"));
        assert_eq!(table.members(&room), vec![conn("x")]);

        // Unknown room
        table.leave(&RoomId::from("nowhere"), &conn("x"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_peers_of_requires_membership() {
        let table = RoomTable::new();
        let room = RoomId::from("r1");

        assert!(table.peers_of(&room, &conn("x")).is_empty());

        table.join(&room, &conn("x"));
        table.join(&room, &conn("y"));

        assert_eq!(table.peers_of(&room, &conn("x")), vec![conn("y")]);
        assert!(table.peers_of(&room, &conn("z")).is_empty());
    }

    #[test]
    fn test_observe_unknown_room() {
        let table = RoomTable::new();
        assert_eq!(table.observe(&RoomId::from("r1"), SignalKind::Answer), None);
    }

    #[test]
    fn test_concurrent_joins_admit_two() {
        const JOINERS: usize = 16;

        for _ in 0..20 {
            let table = Arc::new(RoomTable::new());
            let barrier = Arc::new(Barrier::new(JOINERS));

            let handles: Vec<_> = (0..JOINERS)
                .map(|i| {
                    let table = table.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        table.join(&RoomId::from("r1"), &ConnectionId::from(format!("c{}", i).as_str()))
                    })
                })
                .collect();

            let outcomes: Vec<JoinOutcome> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            let count = |o: JoinOutcome| outcomes.iter().filter(|x| **x == o).count();
            assert_eq!(count(JoinOutcome::Created), 1);
            assert_eq!(count(JoinOutcome::Joined), 1);
            assert_eq!(count(JoinOutcome::Full), JOINERS - ROOM_CAPACITY);
            assert_eq!(table.members(&RoomId::from("r1")).len(), ROOM_CAPACITY);
        }
    }
}
