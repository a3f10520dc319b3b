//! Fan-out of events to a channel's live subscribers.
//!
//! Delivery is fire-and-forget per connection: the payload is serialized
//! once and pushed onto each subscriber's bounded outgoing queue with
//! `try_send`. A closed or backed-up connection has its frame dropped and
//! never stalls or fails delivery to the others.

use crate::events::ServerEvent;
use crate::metrics;
use crate::state::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};
use uuid::Uuid;

/// Delivers payloads to every connection subscribed to a channel.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast an event to the channel's subscribers at the time of the
    /// call. Returns the number of connections the frame was queued for.
    pub fn broadcast(&self, channel_id: Uuid, event: &ServerEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%channel_id, error = %e, "Failed to serialize broadcast payload");
                return 0;
            }
        };

        let mut delivered = 0;
        for sender in self.registry.channel_senders(channel_id) {
            match sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    // Slow consumer: drop the frame for this connection only.
                    metrics::record_dropped();
                    debug!(%channel_id, "Subscriber queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    // Connection raced its own disconnect; cleanup happens
                    // in the connection task.
                }
            }
        }

        metrics::record_fanout(delivered);
        delivered
    }
}
