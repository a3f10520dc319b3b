//! Message pipeline: validate, persist, reload, broadcast.

use super::Context;
use crate::error::{GatewayError, GatewayResult};
use crate::events::ServerEvent;
use crate::metrics;
use tracing::debug;
use uuid::Uuid;

/// Persist a message and fan it out to the channel's live subscribers.
///
/// The send path never re-derives authorization from the payload's
/// channel id: the connection must already be subscribed to exactly that
/// channel, which was authorized at join time. A store failure anywhere
/// before the broadcast aborts the whole operation; no partial broadcast
/// is ever sent, and the caller is expected to resend.
pub async fn handle_message(
    ctx: &Context<'_>,
    channel_id: Uuid,
    content: String,
) -> GatewayResult {
    if content.trim().is_empty() {
        return Err(GatewayError::InvalidInput("empty content".to_string()));
    }
    if content.chars().count() > ctx.limits.max_message_length {
        return Err(GatewayError::InvalidInput("content too long".to_string()));
    }

    let Some(principal) = ctx.registry.principal(ctx.conn_id) else {
        debug!(conn_id = %ctx.conn_id, "Message from unregistered connection");
        return Err(GatewayError::Unauthenticated);
    };

    if ctx.registry.subscription(ctx.conn_id) != Some(channel_id) {
        // Spoofed or stale channel id; join is the authorization point.
        return Err(GatewayError::Forbidden);
    }

    let message_id = ctx
        .db
        .messages()
        .append(channel_id, principal.user_id, &content)
        .await
        .map_err(GatewayError::from)?;

    // Reload joined with the sender's current display profile so the
    // broadcast reflects the profile at send time, not a stale snapshot.
    let record = ctx
        .db
        .messages()
        .fetch_with_sender(message_id)
        .await
        .map_err(GatewayError::from)?;

    let delivered = ctx
        .broadcaster
        .broadcast(channel_id, &ServerEvent::MessageCreate(record.into()));

    metrics::record_broadcast();
    debug!(
        conn_id = %ctx.conn_id,
        user_id = principal.user_id,
        %channel_id,
        message_id,
        delivered,
        "Message broadcast"
    );
    Ok(())
}
