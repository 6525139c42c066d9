//! Session negotiation relay
//!
//! Client events are routed through a dispatch table to handlers that
//! update the shared state and describe what to send, without touching the
//! transport. [`SignalState::handle`](crate::state::SignalState::handle)
//! performs the delivery.

use duet_core::{ConnectionId, RoomId};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::messages::{ClientMessage, ServerMessage, SignalKind};
use crate::room::JoinOutcome;
use crate::state::SignalState;

/// Messages produced by one handled event
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    /// Reply to the sender only
    pub reply: Option<ServerMessage>,
    /// Messages for other connections
    pub forward: Vec<(ConnectionId, ServerMessage)>,
}

impl Dispatch {
    fn reply(message: ServerMessage) -> Self {
        Self {
            reply: Some(message),
            forward: vec![],
        }
    }

    fn forward(forward: Vec<(ConnectionId, ServerMessage)>) -> Self {
        Self {
            reply: None,
            forward,
        }
    }
}

/// Handler signature shared by every event
pub type Handler = fn(&SignalState, &ConnectionId, ClientMessage) -> Dispatch;

/// Select the handler for a client event
pub fn handler_for(message: &ClientMessage) -> Handler {
    match message {
        ClientMessage::CreateOrJoin { .. } | ClientMessage::JoinRoom { .. } => handle_join,
        ClientMessage::Offer { .. }
        | ClientMessage::Answer { .. }
        | ClientMessage::IceCandidate { .. } => handle_signal,
        ClientMessage::Leave => handle_leave,
        ClientMessage::Ping { .. } => handle_ping,
    }
}

/// Route a client event to its handler
pub fn dispatch(state: &SignalState, sender: &ConnectionId, message: ClientMessage) -> Dispatch {
    trace!("{} from {}", message.event(), sender);
    handler_for(&message)(state, sender, message)
}

fn handle_join(state: &SignalState, sender: &ConnectionId, message: ClientMessage) -> Dispatch {
    let room = match message {
        ClientMessage::CreateOrJoin { room } | ClientMessage::JoinRoom { room } => room,
        _ => return Dispatch::default(),
    };

    let outcome = create_or_join(state, sender, &room);
    Dispatch::reply(ServerMessage::join_reply(outcome, room))
}

fn handle_signal(state: &SignalState, sender: &ConnectionId, message: ClientMessage) -> Dispatch {
    let (room, kind, payload) = match message {
        ClientMessage::Offer { room, payload } => (room, SignalKind::Offer, payload),
        ClientMessage::Answer { room, payload } => (room, SignalKind::Answer, payload),
        ClientMessage::IceCandidate { room, payload } => (room, SignalKind::IceCandidate, payload),
        _ => return Dispatch::default(),
    };

    Dispatch::forward(forward(state, sender, &room, kind, payload))
}

fn handle_leave(state: &SignalState, sender: &ConnectionId, _message: ClientMessage) -> Dispatch {
    leave(state, sender);
    Dispatch::default()
}

fn handle_ping(_state: &SignalState, _sender: &ConnectionId, message: ClientMessage) -> Dispatch {
    match message {
        ClientMessage::Ping { timestamp } => Dispatch::reply(ServerMessage::Pong { timestamp }),
        _ => Dispatch::default(),
    }
}

/// Join `room` and record the membership
///
/// A connection already in another room leaves it only once the new join has
/// succeeded; a `Full` reply leaves its current membership untouched.
pub fn create_or_join(state: &SignalState, conn: &ConnectionId, room: &RoomId) -> JoinOutcome {
    let outcome = state.rooms.join(room, conn);
    match outcome {
        JoinOutcome::Created | JoinOutcome::Joined => {
            if let Some(previous) = state.registry.room_of(conn) {
                if previous != *room {
                    debug!("{} switching from room {} to {}", conn, previous, room);
                    state.rooms.leave(&previous, conn);
                    info!("{} left room {}", conn, previous);
                }
            }

            if let Err(e) = state.registry.set_room(conn, Some(room.clone())) {
                // Disconnected mid-join; undo so the slot is not held by a ghost
                warn!("Join of room {} by {} rolled back: {}", room, conn, e);
                state.rooms.leave(room, conn);
            } else {
                info!("{} {} room {}", conn, outcome_verb(outcome), room);
            }
        }
        JoinOutcome::Full => info!("{} refused: room {} is full", conn, room),
    }
    outcome
}

/// Leave whatever room `conn` is in
pub fn leave(state: &SignalState, conn: &ConnectionId) {
    if let Some(room) = state.registry.room_of(conn) {
        state.rooms.leave(&room, conn);
        if let Err(e) = state.registry.set_room(conn, None) {
            // Removed concurrently by disconnect
            debug!("Clearing room of {}: {}", conn, e);
        }
        info!("{} left room {}", conn, room);
    }
}

/// Address a negotiation payload to every other member of `room`
///
/// Returns no targets when `sender` is alone or not a member; the payload is
/// dropped without telling the sender.
pub fn forward(
    state: &SignalState,
    sender: &ConnectionId,
    room: &RoomId,
    kind: SignalKind,
    payload: Value,
) -> Vec<(ConnectionId, ServerMessage)> {
    let peers = state.rooms.peers_of(room, sender);
    if peers.is_empty() {
        trace!("Dropping {} from {}: no peer in room {}", kind.as_str(), sender, room);
        return vec![];
    }

    if let Some(phase) = state.rooms.observe(room, kind) {
        trace!("Room {} phase after {}: {:?}", room, kind.as_str(), phase);
    }

    peers
        .into_iter()
        .map(|peer| (peer, kind.into_message(payload.clone())))
        .collect()
}

fn outcome_verb(outcome: JoinOutcome) -> &'static str {
    match outcome {
        JoinOutcome::Created => "created",
        JoinOutcome::Joined => "joined",
        JoinOutcome::Full => "refused by",
    }
}
