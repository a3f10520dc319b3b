//! Channel join: the only authorization point for subscriptions.

use super::Context;
use crate::error::{GatewayError, GatewayResult};
use tracing::{debug, info};
use uuid::Uuid;

/// Subscribe a connection to a channel.
///
/// Membership of the channel's owning server is the single gate; there is
/// no per-channel ACL. The check runs on every join because membership
/// can change between joins. An unauthorized or unknown channel id gets
/// the same silent outcome, so probing cannot distinguish "exists but
/// denied" from "does not exist".
pub async fn handle_join(ctx: &Context<'_>, channel_id: Uuid) -> GatewayResult {
    let Some(principal) = ctx.registry.principal(ctx.conn_id) else {
        debug!(conn_id = %ctx.conn_id, "Join from unregistered connection");
        return Err(GatewayError::Unauthenticated);
    };

    let authorized = ctx
        .db
        .channels()
        .member_can_access(channel_id, principal.user_id)
        .await
        .map_err(GatewayError::from)?;

    if !authorized {
        return Err(GatewayError::Forbidden);
    }

    // Evicts any previous subscription: one channel per connection.
    ctx.registry.set_subscription(ctx.conn_id, Some(channel_id));

    info!(
        conn_id = %ctx.conn_id,
        user_id = principal.user_id,
        %channel_id,
        "Joined channel"
    );
    Ok(())
}
