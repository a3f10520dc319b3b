//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds one socket and spawns a [`Connection`] task for each
//! incoming client. Handshake authentication happens inside the
//! connection task, before the socket upgrades.

use crate::auth::TokenVerifier;
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::db::Database;
use crate::network::connection::{Connection, ConnectionShared};
use crate::state::SessionRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// The Gateway accepts incoming connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    shared: ConnectionShared,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        config: &Config,
        registry: Arc<SessionRegistry>,
        db: Database,
        verifier: Arc<TokenVerifier>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.server.listen).await?;
        info!(addr = %config.server.listen, "WebSocket listener bound");

        let shared = ConnectionShared {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            db,
            verifier,
            limits: config.limits.clone(),
            allow_origins: Arc::new(config.server.allow_origins.clone()),
        };

        Ok(Self { listener, shared })
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = Uuid::new_v4();
                    info!(%conn_id, %addr, "Connection accepted");

                    let connection =
                        Connection::new(conn_id, stream, addr, self.shared.clone());
                    tokio::spawn(async move {
                        if let Err(e) = connection.run().await {
                            error!(%conn_id, %addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
