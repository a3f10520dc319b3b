//! Bearer credential verification.
//!
//! Connections authenticate once, at the WebSocket handshake, with an
//! HS256-signed access token carrying `{sub, exp}`. Verification is a pure
//! check: it produces a [`Principal`] and touches no state. Token issuance
//! and refresh-token rotation live in the external auth service; this
//! gateway only verifies.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur during credential verification.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),

    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    #[error("auth secret is not configured")]
    SecretUnset,
}

impl AuthError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::InvalidSubject(_) => "invalid_subject",
            Self::SecretUnset => "secret_unset",
        }
    }
}

/// The verified identity attached to a connection.
///
/// Derived fresh from each verified credential; the backing user row is
/// the [`crate::db::UserRepository`]'s business. Expiry is captured at
/// handshake time — a token expiring mid-connection is not proactively
/// revoked, re-verification happens at reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Access token claims, as minted by the auth service.
#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    exp: usize,
}

/// Stateless verifier for bearer credentials.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier from the server-held secret.
    ///
    /// An empty secret is a configuration error; callers must treat it as
    /// fatal rather than continue with unverifiable credentials.
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::SecretUnset);
        }
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    /// Verify a bearer credential and extract its principal.
    ///
    /// Signature and expiry are checked by the JWT layer; the subject
    /// claim must parse as a base-10 integer user id.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;

        let user_id: i64 = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidSubject(data.claims.sub.clone()))?;

        let expires_at = DateTime::from_timestamp(data.claims.exp as i64, 0)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Principal {
            user_id,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    const SECRET: &str = "test-secret";

    fn mint(sub: &str, exp_offset_secs: i64) -> String {
        let claims = TestClaims {
            sub: sub.to_string(),
            exp: (Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode")
    }

    #[test]
    fn verify_roundtrip() {
        let verifier = TokenVerifier::new(SECRET).unwrap();
        let principal = verifier.verify(&mint("42", 900)).expect("valid token");
        assert_eq!(principal.user_id, 42);
        assert!(principal.expires_at > Utc::now());
    }

    #[test]
    fn expired_token_rejected() {
        let verifier = TokenVerifier::new(SECRET).unwrap();
        // Past the default validation leeway.
        let result = verifier.verify(&mint("42", -3600));
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[test]
    fn wrong_secret_rejected() {
        let verifier = TokenVerifier::new("other-secret").unwrap();
        assert!(matches!(
            verifier.verify(&mint("42", 900)),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn malformed_token_rejected() {
        let verifier = TokenVerifier::new(SECRET).unwrap();
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(AuthError::InvalidCredential(_))
        ));
        assert!(matches!(
            verifier.verify(""),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn non_integer_subject_rejected() {
        let verifier = TokenVerifier::new(SECRET).unwrap();
        assert!(matches!(
            verifier.verify(&mint("alice", 900)),
            Err(AuthError::InvalidSubject(_))
        ));
    }

    #[test]
    fn empty_secret_is_configuration_error() {
        assert!(matches!(TokenVerifier::new(""), Err(AuthError::SecretUnset)));
    }
}
