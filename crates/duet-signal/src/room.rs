//! Room state machine
//!
//! A room moves through `Empty -> Waiting -> Negotiating -> Connected` as
//! members join and negotiation traffic passes through it. Every transition
//! is a pure function from one state to the next, so the two-member cap is
//! carried by the type rather than checked by callers.

use duet_core::{ConnectionId, ROOM_CAPACITY};
use serde::Serialize;

use crate::messages::SignalKind;

/// Result of a join attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Caller is the first member (the offer-capable creator)
    Created,
    /// Caller is the second member
    Joined,
    /// Room already has two members; nothing changed
    Full,
}

/// Membership and negotiation progress of a single room
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RoomState {
    #[default]
    Empty,
    /// Creator is waiting for a second member
    Waiting { creator: ConnectionId },
    /// Both members present, no answer seen yet
    Negotiating {
        creator: ConnectionId,
        joiner: ConnectionId,
    },
    /// An answer has been relayed
    Connected {
        creator: ConnectionId,
        joiner: ConnectionId,
    },
}

/// Tag of a [`RoomState`], for stats and logging
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Empty,
    Waiting,
    Negotiating,
    Connected,
}

impl RoomState {
    /// Add a member
    pub fn join(self, conn: &ConnectionId) -> (Self, JoinOutcome) {
        match self {
            RoomState::Empty => (
                RoomState::Waiting {
                    creator: conn.clone(),
                },
                JoinOutcome::Created,
            ),
            RoomState::Waiting { creator } if creator == *conn => {
                (RoomState::Waiting { creator }, JoinOutcome::Created)
            }
            RoomState::Waiting { creator } => (
                RoomState::Negotiating {
                    creator,
                    joiner: conn.clone(),
                },
                JoinOutcome::Joined,
            ),
            full => {
                debug_assert!(full.is_full());
                let outcome = match full.position(conn) {
                    Some(0) => JoinOutcome::Created,
                    Some(_) => JoinOutcome::Joined,
                    None => JoinOutcome::Full,
                };
                (full, outcome)
            }
        }
    }

    /// Remove a member. Non-members leave the state unchanged.
    pub fn leave(self, conn: &ConnectionId) -> Self {
        match self {
            RoomState::Waiting { creator } if creator == *conn => RoomState::Empty,
            RoomState::Negotiating { creator, joiner } | RoomState::Connected { creator, joiner }
                if creator == *conn =>
            {
                // The joiner is promoted so the next arrival joins as second member
                RoomState::Waiting { creator: joiner }
            }
            RoomState::Negotiating { creator, joiner } | RoomState::Connected { creator, joiner }
                if joiner == *conn =>
            {
                RoomState::Waiting { creator }
            }
            other => other,
        }
    }

    /// Advance the negotiation phase after relaying `kind`
    pub fn observe(self, kind: SignalKind) -> Self {
        match (self, kind) {
            (RoomState::Negotiating { creator, joiner }, SignalKind::Answer) => {
                RoomState::Connected { creator, joiner }
            }
            (RoomState::Connected { creator, joiner }, SignalKind::Offer) => {
                RoomState::Negotiating { creator, joiner }
            }
            (state, _) => state,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            RoomState::Empty => Phase::Empty,
            RoomState::Waiting { .. } => Phase::Waiting,
            RoomState::Negotiating { .. } => Phase::Negotiating,
            RoomState::Connected { .. } => Phase::Connected,
        }
    }

    /// Members in join order
    pub fn members(&self) -> Vec<ConnectionId> {
        match self {
            RoomState::Empty => vec![],
            RoomState::Waiting { creator } => vec![creator.clone()],
            RoomState::Negotiating { creator, joiner } | RoomState::Connected { creator, joiner } => {
                vec![creator.clone(), joiner.clone()]
            }
        }
    }

    /// Whether the room holds its maximum number of members
    pub fn is_full(&self) -> bool {
        self.members().len() >= ROOM_CAPACITY
    }

    /// Every member other than `conn`, or nothing if `conn` is not a member
    pub fn peers_of(&self, conn: &ConnectionId) -> Vec<ConnectionId> {
        if !self.contains(conn) {
            return vec![];
        }
        self.members().into_iter().filter(|m| m != conn).collect()
    }

    pub fn contains(&self, conn: &ConnectionId) -> bool {
        self.position(conn).is_some()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RoomState::Empty)
    }

    fn position(&self, conn: &ConnectionId) -> Option<usize> {
        self.members().iter().position(|m| m == conn)
    }
}
