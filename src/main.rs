//! quayd - multi-tenant chat gateway daemon.

use quayd::auth::TokenVerifier;
use quayd::config::Config;
use quayd::db::Database;
use quayd::network::Gateway;
use quayd::state::SessionRegistry;
use quayd::{http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.server.listen,
        "Starting quayd"
    );

    // Refuse to start without a usable auth secret: every connection
    // would be unverifiable, which is a configuration error, not a
    // per-request condition.
    let verifier = match TokenVerifier::new(&config.auth.secret) {
        Ok(verifier) => Arc::new(verifier),
        Err(e) => {
            error!("FATAL: auth secret is not configured!");
            error!("  Bearer tokens cannot be verified without the shared HMAC secret.");
            error!("  Set it in {config_path}:");
            error!("    [auth]");
            error!("    secret = \"<random-32-char-string>\"");
            error!("");
            error!("  Generate one with:");
            error!("    openssl rand -hex 32");
            return Err(anyhow::anyhow!(
                "Refusing to start without an auth secret: {e}"
            ));
        }
    };

    // Initialize database
    let db = Database::new(&config.database.path).await?;

    // In-memory session registry shared by every connection handler
    let registry = Arc::new(SessionRegistry::new());

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Metrics HTTP server started");
    }

    // Start the gateway
    let gateway = Gateway::bind(&config, registry, db, verifier).await?;
    gateway.run().await?;

    Ok(())
}
