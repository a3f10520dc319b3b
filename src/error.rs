//! Unified error handling for quayd.
//!
//! Each layer keeps its own error enum (`AuthError` in [`crate::auth`],
//! `DbError` in [`crate::db`]); this module provides the gateway-level
//! taxonomy they map into, with metric labeling and HTTP status mapping
//! for the request/response surface.

use crate::auth::AuthError;
use crate::db::DbError;
use thiserror::Error;

/// Errors that can occur while processing a gateway operation.
///
/// For persistent-connection events (join/message), `Forbidden`,
/// `NotFound` and `InvalidInput` are deliberate silent no-ops: the client
/// observes nothing, which avoids leaking channel existence or
/// authorization state to a misbehaving peer.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] DbError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// HTTP status for the request/response surface.
    ///
    /// Socket events never surface these to the client; the external CRUD
    /// API maps every taxonomy member to a distinct status.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::InvalidInput(_) => 400,
            Self::StoreUnavailable(_) => 503,
            Self::Configuration(_) => 500,
        }
    }

    /// Whether this error is a silent no-op for socket events.
    ///
    /// `StoreUnavailable` is not silent: it is logged at warn level and
    /// aborts the single operation without closing the connection.
    pub fn is_silent_for_events(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::Forbidden | Self::NotFound(_) | Self::InvalidInput(_)
        )
    }
}

impl From<DbError> for GatewayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ServerNotFound(id) => Self::NotFound(format!("server {id}")),
            DbError::MessageNotFound(id) => Self::NotFound(format!("message {id}")),
            DbError::UserNotFound(id) => Self::NotFound(format!("user {id}")),
            DbError::ServerNotPublic(_) | DbError::NotAMember => Self::Forbidden,
            DbError::ChannelNameTaken(name) => Self::Conflict(format!("channel {name}")),
            e @ (DbError::Sqlx(_) | DbError::Migration(_)) => Self::StoreUnavailable(e),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::SecretUnset => {
                Self::Configuration("auth secret is not configured".to_string())
            }
            _ => Self::Unauthenticated,
        }
    }
}

/// Result type for gateway event handlers.
pub type GatewayResult = Result<(), GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(GatewayError::Unauthenticated.error_code(), "unauthenticated");
        assert_eq!(GatewayError::Forbidden.error_code(), "forbidden");
        assert_eq!(
            GatewayError::InvalidInput("x".into()).error_code(),
            "invalid_input"
        );
    }

    #[test]
    fn db_errors_map_to_taxonomy() {
        let id = Uuid::new_v4();
        assert!(matches!(
            GatewayError::from(DbError::ServerNotFound(id)),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            GatewayError::from(DbError::ServerNotPublic(id)),
            GatewayError::Forbidden
        ));
        assert!(matches!(
            GatewayError::from(DbError::ChannelNameTaken("general".into())),
            GatewayError::Conflict(_)
        ));
    }

    #[test]
    fn silent_event_policy() {
        assert!(GatewayError::Forbidden.is_silent_for_events());
        assert!(GatewayError::InvalidInput("".into()).is_silent_for_events());
        let store = GatewayError::StoreUnavailable(DbError::Sqlx(sqlx::Error::RowNotFound));
        assert!(!store.is_silent_for_events());
    }

    #[test]
    fn http_status_is_distinct_per_member() {
        let statuses = [
            GatewayError::Unauthenticated.http_status(),
            GatewayError::Forbidden.http_status(),
            GatewayError::NotFound("x".into()).http_status(),
            GatewayError::Conflict("x".into()).http_status(),
            GatewayError::InvalidInput("x".into()).http_status(),
            GatewayError::Configuration("x".into()).http_status(),
        ];
        let mut dedup = statuses.to_vec();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), statuses.len());
    }
}
