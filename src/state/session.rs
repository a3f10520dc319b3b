//! Per-connection session state.

use crate::auth::Principal;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of one physical connection.
pub type ConnectionId = Uuid;

/// Ephemeral state for a single authenticated connection.
///
/// Created on successful handshake, destroyed on disconnect. The session
/// is exclusively owned by the [`crate::state::SessionRegistry`] for the
/// lifetime of the connection; `subscribed_channel` is either absent or a
/// channel the principal's server membership authorized at join time.
#[derive(Debug)]
pub struct ConnectionSession {
    /// The verified identity bound to this connection at handshake.
    pub principal: Principal,

    /// The channel this connection is subscribed to, if any.
    /// At most one at a time; joining a new channel evicts the old value.
    pub subscribed_channel: Option<Uuid>,

    /// Outgoing frame queue for this connection's writer task.
    pub sender: mpsc::Sender<String>,
}

impl ConnectionSession {
    pub fn new(principal: Principal, sender: mpsc::Sender<String>) -> Self {
        Self {
            principal,
            subscribed_channel: None,
            sender,
        }
    }
}
