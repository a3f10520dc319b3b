//! Connection - handles an individual client connection.
//!
//! Each connection runs in its own tokio task:
//!
//! 1. WebSocket handshake with origin and bearer-token validation in the
//!    header callback; a bad credential rejects the upgrade with 401.
//! 2. Just-in-time user provisioning; a store failure here rejects the
//!    connection rather than proceeding with an unprovisioned identity.
//! 3. A unified `tokio::select!` loop over the socket reader and the
//!    connection's bounded outgoing queue. Events from this connection
//!    are processed in arrival order; fan-out from other connections
//!    lands on the outgoing queue.

use crate::auth::{Principal, TokenVerifier};
use crate::broadcast::Broadcaster;
use crate::config::LimitsConfig;
use crate::db::Database;
use crate::events::{ClientEvent, ReadyPayload, ServerEvent};
use crate::handlers::{self, Context};
use crate::metrics;
use crate::state::{ConnectionId, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, info, instrument, warn};

/// State shared by every connection task.
#[derive(Clone)]
pub struct ConnectionShared {
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Broadcaster,
    pub db: Database,
    pub verifier: Arc<TokenVerifier>,
    pub limits: LimitsConfig,
    pub allow_origins: Arc<Vec<String>>,
}

/// A client connection handler.
pub struct Connection {
    conn_id: ConnectionId,
    addr: SocketAddr,
    stream: TcpStream,
    shared: ConnectionShared,
}

impl Connection {
    /// Create a new connection handler.
    pub fn new(
        conn_id: ConnectionId,
        stream: TcpStream,
        addr: SocketAddr,
        shared: ConnectionShared,
    ) -> Self {
        Self {
            conn_id,
            addr,
            stream,
            shared,
        }
    }

    /// Run the connection: handshake, provision, event loop, cleanup.
    #[instrument(skip(self), fields(conn_id = %self.conn_id, addr = %self.addr), name = "connection")]
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            conn_id,
            addr,
            stream,
            shared,
        } = self;

        // Handshake: validate Origin and verify the bearer credential
        // before the upgrade completes. The verified principal is carried
        // out of the callback; rejections answer with a plain HTTP status.
        let mut principal_slot: Option<Principal> = None;
        let verifier = Arc::clone(&shared.verifier);
        let allow_origins = Arc::clone(&shared.allow_origins);

        let auth_callback = |req: &Request, response: Response| {
            if !allow_origins.is_empty() {
                let origin_ok = req
                    .headers()
                    .get("Origin")
                    .and_then(|o| o.to_str().ok())
                    .is_some_and(|origin| {
                        allow_origins.iter().any(|a| a == origin || a == "*")
                    });
                if !origin_ok {
                    warn!(%addr, "WebSocket origin rejected");
                    return Err(error_response(
                        http::StatusCode::FORBIDDEN,
                        "Origin not allowed",
                    ));
                }
            }

            let Some(token) = bearer_token(req) else {
                info!(%addr, "Handshake rejected: missing credential");
                return Err(error_response(
                    http::StatusCode::UNAUTHORIZED,
                    "Missing credential",
                ));
            };

            match verifier.verify(token) {
                Ok(principal) => {
                    principal_slot = Some(principal);
                    Ok(response)
                }
                Err(e) => {
                    info!(%addr, code = e.error_code(), "Handshake rejected");
                    Err(error_response(
                        http::StatusCode::UNAUTHORIZED,
                        "Invalid credential",
                    ))
                }
            }
        };

        let ws_stream = match accept_hdr_async(stream, auth_callback).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(%addr, error = %e, "WebSocket handshake failed");
                return Ok(());
            }
        };
        let Some(principal) = principal_slot else {
            // Callback rejected; accept_hdr_async already returned Err above.
            return Ok(());
        };

        // JIT provisioning: every principal gets a durable user row before
        // any other operation proceeds for it.
        let user = match shared.db.users().ensure(principal.user_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = principal.user_id, error = %e, "User provisioning failed, rejecting connection");
                let mut ws_stream = ws_stream;
                let _ = ws_stream.close(None).await;
                return Ok(());
            }
        };

        let user_id = user.id;
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(shared.limits.outgoing_queue);
        shared.registry.register(conn_id, principal, outgoing_tx);
        metrics::session_opened();
        info!(user_id, "Session registered");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        // Ready burst: the provisioned profile, so clients can render
        // before their first join.
        let ready = ServerEvent::Ready(ReadyPayload { user: user.into() });
        match serde_json::to_string(&ready) {
            Ok(frame) => {
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    debug!(error = %e, "Failed to send ready frame");
                    shared.registry.unregister(conn_id);
                    metrics::session_closed();
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize ready frame"),
        }

        let ctx = Context {
            conn_id,
            registry: shared.registry.as_ref(),
            broadcaster: &shared.broadcaster,
            db: &shared.db,
            limits: &shared.limits,
        };

        // Unified event loop.
        loop {
            tokio::select! {
                inbound = ws_rx.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(&text) {
                                Ok(event) => handlers::dispatch(&ctx, event).await,
                                // Malformed frames are InvalidInput: silent no-op.
                                Err(e) => debug!(error = %e, "Malformed frame ignored"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Client disconnected");
                            break;
                        }
                        // Pings are answered by the protocol layer.
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(_)) => {
                            debug!("Non-text frame ignored");
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "Read error");
                            break;
                        }
                    }
                }

                outbound = outgoing_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                                debug!(error = %e, "Write error");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        shared.registry.unregister(conn_id);
        metrics::session_closed();
        info!(user_id, "Session closed");

        Ok(())
    }
}

/// Extract the bearer credential from an upgrade request.
///
/// `Authorization: Bearer <token>` wins; browser clients that cannot set
/// headers on WebSocket upgrades fall back to a `token` query parameter.
fn bearer_token(req: &Request) -> Option<&str> {
    if let Some(value) = req.headers().get("Authorization")
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token);
    }

    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
}

fn error_response(status: http::StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(()).expect("request")
    }

    #[test]
    fn bearer_token_from_header() {
        let req = upgrade_request("wss://quay.test/gateway", Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_from_query() {
        let req = upgrade_request("wss://quay.test/gateway?token=abc.def.ghi&v=1", None);
        assert_eq!(bearer_token(&req), Some("abc.def.ghi"));
    }

    #[test]
    fn header_wins_over_query() {
        let req = upgrade_request("wss://quay.test/gateway?token=query", Some("Bearer header"));
        assert_eq!(bearer_token(&req), Some("header"));
    }

    #[test]
    fn missing_token_is_none() {
        let req = upgrade_request("wss://quay.test/gateway", None);
        assert_eq!(bearer_token(&req), None);

        let req = upgrade_request("wss://quay.test/gateway?token=", None);
        assert_eq!(bearer_token(&req), None);
    }
}
