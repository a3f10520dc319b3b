//! Server repository: creation, membership, and the public-join flow.

use crate::db::DbError;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::channels::ChannelRecord;

/// Server visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            _ => Self::Private,
        }
    }
}

/// A server row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<i64>,
    pub visibility: Visibility,
    pub created_at: i64,
}

/// Repository for server operations.
pub struct ServerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ServerRepository<'a> {
    /// Create a new server repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a server owned by `owner_id`.
    ///
    /// The server row, the creator's membership, and the default "general"
    /// channel are committed as a single transaction: no reader can ever
    /// observe a server without its default channel or its owner's
    /// membership.
    pub async fn create(
        &self,
        owner_id: i64,
        name: &str,
        visibility: Visibility,
    ) -> Result<(ServerRecord, ChannelRecord), DbError> {
        let server_id = Uuid::new_v4();
        let channel_id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO servers (id, name, created_by, visibility, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(server_id.to_string())
        .bind(name)
        .bind(owner_id)
        .bind(visibility.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO server_members (server_id, user_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(server_id.to_string())
        .bind(owner_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO channels (id, server_id, name, topic, position, created_at)
            VALUES (?, ?, 'general', NULL, 0, ?)
            "#,
        )
        .bind(channel_id.to_string())
        .bind(server_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((
            ServerRecord {
                id: server_id,
                name: name.to_string(),
                created_by: Some(owner_id),
                visibility,
                created_at: now,
            },
            ChannelRecord {
                id: channel_id,
                server_id,
                name: "general".to_string(),
                topic: None,
                position: 0,
                created_at: now,
            },
        ))
    }

    /// Join a public server, idempotently.
    ///
    /// The visibility check and the membership insert share one write
    /// transaction so a concurrent visibility flip cannot slip between
    /// them. Re-joining by an existing member is a no-op.
    pub async fn join_public(&self, user_id: i64, server_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let visibility: Option<(String,)> =
            sqlx::query_as("SELECT visibility FROM servers WHERE id = ?")
                .bind(server_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

        match visibility {
            None => return Err(DbError::ServerNotFound(server_id)),
            Some((v,)) if Visibility::parse(&v) != Visibility::Public => {
                return Err(DbError::ServerNotPublic(server_id));
            }
            Some(_) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO server_members (server_id, user_id, joined_at)
            VALUES (?, ?, ?)
            ON CONFLICT(server_id, user_id) DO NOTHING
            "#,
        )
        .bind(server_id.to_string())
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Check whether a user is a member of a server.
    pub async fn is_member(&self, server_id: Uuid, user_id: i64) -> Result<bool, DbError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM server_members WHERE server_id = ? AND user_id = ?",
        )
        .bind(server_id.to_string())
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Find a server by id.
    pub async fn find(&self, server_id: Uuid) -> Result<Option<ServerRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, Option<i64>, String, i64)>(
            r#"
            SELECT id, name, created_by, visibility, created_at
            FROM servers
            WHERE id = ?
            "#,
        )
        .bind(server_id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(|(id, name, created_by, visibility, created_at)| {
            Ok(ServerRecord {
                id: parse_uuid(&id)?,
                name,
                created_by,
                visibility: Visibility::parse(&visibility),
                created_at,
            })
        })
        .transpose()
    }

    /// List the servers a user belongs to, oldest membership first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<ServerRecord>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, Option<i64>, String, i64)>(
            r#"
            SELECT s.id, s.name, s.created_by, s.visibility, s.created_at
            FROM servers s
            JOIN server_members m ON m.server_id = s.id
            WHERE m.user_id = ?
            ORDER BY m.joined_at, s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name, created_by, visibility, created_at)| {
                Ok(ServerRecord {
                    id: parse_uuid(&id)?,
                    name,
                    created_by,
                    visibility: Visibility::parse(&visibility),
                    created_at,
                })
            })
            .collect()
    }
}

/// Decode a TEXT uuid column; a non-uuid value means the row is corrupt.
pub(super) fn parse_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| {
        DbError::Sqlx(sqlx::Error::ColumnDecode {
            index: "uuid".to_string(),
            source: Box::new(e),
        })
    })
}
