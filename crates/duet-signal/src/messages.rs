//! Signal protocol messages
//!
//! Every WebSocket text frame carries one JSON object tagged by `event`.
//! Negotiation payloads are kept as raw JSON values and never inspected.

use duet_core::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::JoinOutcome;

/// Messages sent by clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a room, creating it if needed
    CreateOrJoin { room: RoomId },

    /// Join a room (same capacity-checked path as `CreateOrJoin`)
    JoinRoom { room: RoomId },

    /// Session description offer for the other member
    Offer { room: RoomId, payload: Value },

    /// Session description answer for the other member
    Answer { room: RoomId, payload: Value },

    /// Connectivity candidate for the other member
    IceCandidate { room: RoomId, payload: Value },

    /// Leave the current room
    Leave,

    /// Application-level keepalive
    Ping { timestamp: u64 },
}

/// Messages sent by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sender is the first member of a new room
    Created { room: RoomId },

    /// Sender is the second member of an existing room
    Joined { room: RoomId },

    /// Room already holds two members
    Full { room: RoomId },

    /// Relayed offer
    Offer { payload: Value },

    /// Relayed answer
    Answer { payload: Value },

    /// Relayed connectivity candidate
    IceCandidate { payload: Value },

    /// Keepalive response
    Pong { timestamp: u64 },
}

/// Kinds of negotiation traffic the relay forwards
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// Wrap a payload for delivery to a peer
    pub fn into_message(self, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer { payload },
            SignalKind::Answer => ServerMessage::Answer { payload },
            SignalKind::IceCandidate => ServerMessage::IceCandidate { payload },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

impl ClientMessage {
    /// Event name, for logging
    pub fn event(&self) -> &'static str {
        match self {
            ClientMessage::CreateOrJoin { .. } => "create-or-join",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::Leave => "leave",
            ClientMessage::Ping { .. } => "ping",
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Reply describing the outcome of a join
    pub fn join_reply(outcome: JoinOutcome, room: RoomId) -> Self {
        match outcome {
            JoinOutcome::Created => ServerMessage::Created { room },
            JoinOutcome::Joined => ServerMessage::Joined { room },
            JoinOutcome::Full => ServerMessage::Full { room },
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_names() {
        let msg = ClientMessage::from_json(r#"{"event":"create-or-join","room":"r1"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateOrJoin { room: "r1".into() });

        let msg = ClientMessage::from_json(
            r#"{"event":"ice-candidate","room":"r1","payload":{"candidate":"a=1","sdpMLineIndex":0}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::IceCandidate { room, payload } => {
                assert_eq!(room.as_str(), "r1");
                assert_eq!(payload["sdpMLineIndex"], 0);
            }
            _ => panic!("wrong message type"),
        }

        let msg = ClientMessage::from_json(r#"{"event":"leave"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Leave);
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(ClientMessage::from_json(r#"{"event":"kick","room":"r1"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"event":"offer","payload":{}}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_relayed_payload_untouched() {
        let payload = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"});
        let msg = SignalKind::Offer.into_message(payload.clone());

        let json = msg.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "offer");
        assert_eq!(value["payload"], payload);
        assert!(value.get("room").is_none());
    }

    #[test]
    fn test_join_reply() {
        let msg = ServerMessage::join_reply(JoinOutcome::Full, "r1".into());
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"event":"full","room":"r1"}"#);
    }
}
