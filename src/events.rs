//! Wire-format event types for the WebSocket gateway.
//!
//! Frames are JSON with an `op` discriminant and camelCase data fields.
//! Identifiers wider than 53 bits (user ids, message ids) are stringified
//! at this boundary so they survive JSON-numeric transports; the HTTP
//! history endpoint serializes the same `MessagePayload` shape.

use crate::db::{MessageRecord, MessageSender, UserRecord};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Inbound events a connected client may send.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Subscribe this connection to a channel.
    Join { channel_id: Uuid },
    /// Send a message to the connection's current channel.
    Message { channel_id: Uuid, content: String },
}

impl ClientEvent {
    /// Stable operation name for metrics labeling.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Message { .. } => "message",
        }
    }
}

/// Outbound events pushed to connected clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once after a successful handshake.
    Ready(ReadyPayload),
    /// A message was persisted to the channel this connection subscribes to.
    MessageCreate(MessagePayload),
}

/// Payload of the `ready` event.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub user: SenderPayload,
}

/// A persisted message joined with its sender's current profile.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(serialize_with = "id_as_string")]
    pub id: i64,
    pub channel_id: Uuid,
    pub content: String,
    pub sent_at: i64,
    pub edited_at: Option<i64>,
    pub sender: Option<SenderPayload>,
}

/// Sender profile fields carried on a message or ready payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SenderPayload {
    #[serde(serialize_with = "id_as_string")]
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

fn id_as_string<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

impl From<MessageSender> for SenderPayload {
    fn from(sender: MessageSender) -> Self {
        Self {
            id: sender.id,
            display_name: sender.display_name,
            avatar_url: sender.avatar_url,
        }
    }
}

impl From<MessageRecord> for MessagePayload {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            channel_id: record.channel_id,
            content: record.content,
            sent_at: record.sent_at,
            edited_at: record.edited_at,
            sender: record.sender.map(SenderPayload::from),
        }
    }
}

impl From<UserRecord> for SenderPayload {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}
