//! Event handlers for the persistent-connection surface.
//!
//! One handler invocation per inbound event. Events from a single
//! connection are serialized by its connection task; events from
//! different connections run concurrently with no ordering guarantee.

mod join;
mod message;

pub use join::handle_join;
pub use message::handle_message;

use crate::broadcast::Broadcaster;
use crate::config::LimitsConfig;
use crate::db::Database;
use crate::events::ClientEvent;
use crate::metrics;
use crate::state::{ConnectionId, SessionRegistry};
use tracing::{debug, warn};

/// Shared references handed to every event handler.
pub struct Context<'a> {
    pub conn_id: ConnectionId,
    pub registry: &'a SessionRegistry,
    pub broadcaster: &'a Broadcaster,
    pub db: &'a Database,
    pub limits: &'a LimitsConfig,
}

/// Dispatch one inbound event to its handler.
///
/// `Forbidden`, `NotFound` and `InvalidInput` outcomes are silent no-ops
/// toward the client: no state change, no error frame, log only. A
/// transient store failure aborts the single operation without closing
/// the connection.
pub async fn dispatch(ctx: &Context<'_>, event: ClientEvent) {
    let op = event.op();
    metrics::record_event(op);

    let result = match event {
        ClientEvent::Join { channel_id } => join::handle_join(ctx, channel_id).await,
        ClientEvent::Message {
            channel_id,
            content,
        } => message::handle_message(ctx, channel_id, content).await,
    };

    if let Err(e) = result {
        metrics::record_event_error(op, e.error_code());
        if e.is_silent_for_events() {
            debug!(conn_id = %ctx.conn_id, op, error = %e, "Event dropped");
        } else {
            warn!(conn_id = %ctx.conn_id, op, error = %e, "Event failed");
        }
    }
}
