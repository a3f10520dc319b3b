//! Message repository: append-only log plus sender-joined reads.

use crate::db::DbError;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::servers::parse_uuid;

/// A persisted message joined with its sender's current profile.
///
/// `sender` is `None` when the sending user has since been deleted; the
/// message itself survives via `ON DELETE SET NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub channel_id: Uuid,
    pub content: String,
    pub sent_at: i64,
    pub edited_at: Option<i64>,
    pub sender: Option<MessageSender>,
}

/// Sender profile fields carried on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSender {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

type MessageRow = (
    i64,
    String,
    String,
    i64,
    Option<i64>,
    Option<i64>,
    Option<String>,
    Option<String>,
);

fn row_to_record(row: MessageRow) -> Result<MessageRecord, DbError> {
    let (id, channel_id, content, sent_at, edited_at, sender_id, display_name, avatar_url) = row;
    Ok(MessageRecord {
        id,
        channel_id: parse_uuid(&channel_id)?,
        content,
        sent_at,
        edited_at,
        sender: match (sender_id, display_name) {
            (Some(id), Some(display_name)) => Some(MessageSender {
                id,
                display_name,
                avatar_url,
            }),
            _ => None,
        },
    })
}

/// Repository for message operations.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message, returning its assigned id.
    ///
    /// Ids come from one monotonic channel-independent sequence;
    /// `sent_at` is server-assigned.
    pub async fn append(
        &self,
        channel_id: Uuid,
        sender_id: i64,
        content: &str,
    ) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (channel_id, sender_id, content, sent_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(channel_id.to_string())
        .bind(sender_id)
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch a message by id, joined with the sender's current profile.
    ///
    /// The join is deliberately against the live users table: the
    /// broadcast payload reflects the sender's profile at send time, not
    /// a snapshot taken at insert.
    pub async fn fetch_with_sender(&self, message_id: i64) -> Result<MessageRecord, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.channel_id, m.content, m.sent_at, m.edited_at,
                   u.id, u.display_name, u.avatar_url
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.id = ?
            "#,
        )
        .bind(message_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row_to_record(row),
            None => Err(DbError::MessageNotFound(message_id)),
        }
    }

    /// Fetch a channel's messages in insertion order, newest page first.
    ///
    /// `before` is an exclusive message-id cursor for paging backwards
    /// through history.
    pub async fn channel_history(
        &self,
        channel_id: Uuid,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.channel_id, m.content, m.sent_at, m.edited_at,
                   u.id, u.display_name, u.avatar_url
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.channel_id = ? AND m.id < ?
            ORDER BY m.id DESC
            LIMIT ?
            "#,
        )
        .bind(channel_id.to_string())
        .bind(before.unwrap_or(i64::MAX))
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        let mut records: Vec<MessageRecord> = rows
            .into_iter()
            .map(row_to_record)
            .collect::<Result<_, _>>()?;
        // Pages read newest-first; callers want insertion order within a page.
        records.reverse();
        Ok(records)
    }
}
