//! Channel repository.

use crate::db::DbError;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::servers::parse_uuid;

/// A channel row. Channel names are unique per server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: Uuid,
    pub server_id: Uuid,
    pub name: String,
    pub topic: Option<String>,
    pub position: i64,
    pub created_at: i64,
}

/// Repository for channel operations.
pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    /// Create a new channel repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a channel on a server the caller is a member of.
    ///
    /// Fails with `NotAMember` when the caller lacks membership and
    /// `ChannelNameTaken` on a duplicate (server, name) pair.
    pub async fn create(
        &self,
        user_id: i64,
        server_id: Uuid,
        name: &str,
        topic: Option<&str>,
    ) -> Result<ChannelRecord, DbError> {
        let member: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM server_members WHERE server_id = ? AND user_id = ?",
        )
        .bind(server_id.to_string())
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        if member.is_none() {
            return Err(DbError::NotAMember);
        }

        let channel_id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO channels (id, server_id, name, topic, position, created_at)
            VALUES (?, ?, ?, ?,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM channels WHERE server_id = ?),
                ?)
            "#,
        )
        .bind(channel_id.to_string())
        .bind(server_id.to_string())
        .bind(name)
        .bind(topic)
        .bind(server_id.to_string())
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    return Err(DbError::ChannelNameTaken(name.to_string()));
                }
                return Err(e.into());
            }
        }

        self.find(channel_id)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Find a channel by id.
    pub async fn find(&self, channel_id: Uuid) -> Result<Option<ChannelRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, i64, i64)>(
            r#"
            SELECT id, server_id, name, topic, position, created_at
            FROM channels
            WHERE id = ?
            "#,
        )
        .bind(channel_id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(|(id, server_id, name, topic, position, created_at)| {
            Ok(ChannelRecord {
                id: parse_uuid(&id)?,
                server_id: parse_uuid(&server_id)?,
                name,
                topic,
                position,
                created_at,
            })
        })
        .transpose()
    }

    /// List a server's channels in display order.
    pub async fn list_for_server(&self, server_id: Uuid) -> Result<Vec<ChannelRecord>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, i64, i64)>(
            r#"
            SELECT id, server_id, name, topic, position, created_at
            FROM channels
            WHERE server_id = ?
            ORDER BY position, name
            "#,
        )
        .bind(server_id.to_string())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, server_id, name, topic, position, created_at)| {
                Ok(ChannelRecord {
                    id: parse_uuid(&id)?,
                    server_id: parse_uuid(&server_id)?,
                    name,
                    topic,
                    position,
                    created_at,
                })
            })
            .collect()
    }

    /// Check whether a user may subscribe to a channel.
    ///
    /// Membership is keyed on the owning server; there is no per-channel
    /// ACL. A missing channel and a missing membership are deliberately
    /// indistinguishable here so callers cannot leak channel existence.
    pub async fn member_can_access(
        &self,
        channel_id: Uuid,
        user_id: i64,
    ) -> Result<bool, DbError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1
            FROM channels c
            JOIN server_members m ON m.server_id = c.server_id
            WHERE c.id = ? AND m.user_id = ?
            "#,
        )
        .bind(channel_id.to_string())
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }
}
