//! Connection lifecycle: registration, delivery and disconnect cleanup

use duet_core::{ConnectionId, SignalError};
use tracing::{debug, warn};

use crate::messages::{ClientMessage, ServerMessage};
use crate::registry::Outbox;
use crate::relay::{self, Dispatch};
use crate::state::SignalState;

/// Identifier draws before giving up on a collision
const MAX_ID_ATTEMPTS: usize = 4;

impl SignalState {
    /// Allocate an identifier and register a new connection
    pub fn on_connect(&self, outbox: Outbox) -> Result<ConnectionId, SignalError> {
        let mut last_err = None;

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = ConnectionId::generate()?;
            match self.registry.register(id.clone(), outbox.clone()) {
                Ok(()) => {
                    debug!("Registered connection {}", id);
                    return Ok(id);
                }
                Err(e) => {
                    warn!("Connection id collision: {}", e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SignalError::Entropy("no identifier drawn".into())))
    }

    /// Drop a connection and release its room slot
    ///
    /// Safe to call more than once and concurrently with in-flight events.
    pub fn on_disconnect(&self, id: &ConnectionId) {
        if let Some(room) = self.registry.remove(id) {
            self.rooms.leave(&room, id);
            debug!("Connection {} closed, left room {}", id, room);
        } else {
            debug!("Connection {} closed", id);
        }
    }

    /// Run a client event and deliver any forwarded messages
    ///
    /// Returns the reply for the sender.
    pub fn handle(&self, sender: &ConnectionId, message: ClientMessage) -> Option<ServerMessage> {
        let Dispatch { reply, forward } = relay::dispatch(self, sender, message);
        self.deliver(forward);
        reply
    }

    /// Best-effort delivery; a peer that cannot be written to is disconnected
    pub fn deliver(&self, messages: Vec<(ConnectionId, ServerMessage)>) {
        for (peer, message) in messages {
            if !self.registry.send(&peer, message) {
                debug!("Delivery to {} failed, treating as disconnected", peer);
                self.on_disconnect(&peer);
            }
        }
    }
}
