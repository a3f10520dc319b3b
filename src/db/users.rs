//! User repository: just-in-time provisioning and profile updates.

use crate::db::DbError;
use sqlx::SqlitePool;

/// A durable user row, keyed by the external identity from the token subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Which profile fields a caller supplied.
///
/// Each variant resolves to one fixed parameterized statement; no dynamic
/// field-list SQL is assembled.
#[derive(Debug, Clone)]
pub enum ProfileUpdate {
    DisplayName(String),
    AvatarUrl(Option<String>),
    Full {
        display_name: String,
        avatar_url: Option<String>,
    },
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotently ensure a user row exists for a verified principal.
    ///
    /// First contact creates the row with a deterministic username and
    /// display name derived from the id. On conflict only the username
    /// (same deterministic value) and `updated_at` are refreshed, so
    /// user-edited display fields survive reconnects. Safe under
    /// concurrent first contact from multiple connections.
    pub async fn ensure(&self, user_id: i64) -> Result<UserRecord, DbError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(user_id.to_string())
        .bind(format!("User{user_id}"))
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.find(user_id)
            .await?
            .ok_or(DbError::UserNotFound(user_id))
    }

    /// Find a user by id.
    pub async fn find(&self, user_id: i64) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, i64, i64)>(
            r#"
            SELECT id, username, display_name, avatar_url, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(id, username, display_name, avatar_url, created_at, updated_at)| UserRecord {
                id,
                username,
                display_name,
                avatar_url,
                created_at,
                updated_at,
            },
        ))
    }

    /// Update the mutable profile fields of a user.
    ///
    /// Only the owning user may call this; the external CRUD surface
    /// enforces that before reaching the repository.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: ProfileUpdate,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();

        let result = match update {
            ProfileUpdate::DisplayName(display_name) => {
                sqlx::query("UPDATE users SET display_name = ?, updated_at = ? WHERE id = ?")
                    .bind(display_name)
                    .bind(now)
                    .bind(user_id)
                    .execute(self.pool)
                    .await?
            }
            ProfileUpdate::AvatarUrl(avatar_url) => {
                sqlx::query("UPDATE users SET avatar_url = ?, updated_at = ? WHERE id = ?")
                    .bind(avatar_url)
                    .bind(now)
                    .bind(user_id)
                    .execute(self.pool)
                    .await?
            }
            ProfileUpdate::Full {
                display_name,
                avatar_url,
            } => {
                sqlx::query(
                    "UPDATE users SET display_name = ?, avatar_url = ?, updated_at = ? WHERE id = ?",
                )
                .bind(display_name)
                .bind(avatar_url)
                .bind(now)
                .bind(user_id)
                .execute(self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DbError::UserNotFound(user_id));
        }
        Ok(())
    }
}
