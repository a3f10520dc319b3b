//! Session registry: the bridge between verified identity and broadcast.
//!
//! The registry is the single shared mutable structure inside the
//! gateway core. All operations are O(1) or O(members of one channel)
//! and never suspend; handlers for many connections mutate it
//! concurrently through DashMap shards.
//!
//! Lock order: `sessions` shard lock before `subscribers` shard lock.
//! Subscriber id sets are cloned out before senders are resolved so the
//! two maps are never held across each other in the fan-out path.

use crate::auth::Principal;
use crate::state::session::{ConnectionId, ConnectionSession};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-memory table of live connections and their channel subscriptions.
#[derive(Default)]
pub struct SessionRegistry {
    /// Sessions by connection id.
    sessions: DashMap<ConnectionId, ConnectionSession>,

    /// Channel id to subscribed connection ids, for fan-out.
    subscribers: DashMap<Uuid, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection with no subscription.
    pub fn register(
        &self,
        conn_id: ConnectionId,
        principal: Principal,
        sender: mpsc::Sender<String>,
    ) {
        self.sessions
            .insert(conn_id, ConnectionSession::new(principal, sender));
    }

    /// Remove a connection and clear its subscription.
    pub fn unregister(&self, conn_id: ConnectionId) {
        if let Some((_, session)) = self.sessions.remove(&conn_id)
            && let Some(channel_id) = session.subscribed_channel
        {
            self.remove_subscriber(channel_id, conn_id);
        }
    }

    /// Point a connection at a channel, or clear its subscription.
    ///
    /// Any prior subscription is evicted first: a connection is a member
    /// of exactly zero or one channel. Returns false when the connection
    /// is not registered.
    pub fn set_subscription(&self, conn_id: ConnectionId, channel_id: Option<Uuid>) -> bool {
        let Some(mut session) = self.sessions.get_mut(&conn_id) else {
            return false;
        };

        let previous = std::mem::replace(&mut session.subscribed_channel, channel_id);
        drop(session);

        if let Some(prev) = previous
            && previous != channel_id
        {
            self.remove_subscriber(prev, conn_id);
        }
        if let Some(channel_id) = channel_id {
            self.subscribers
                .entry(channel_id)
                .or_default()
                .insert(conn_id);
        }
        true
    }

    /// The principal bound to a connection, if registered.
    pub fn principal(&self, conn_id: ConnectionId) -> Option<Principal> {
        self.sessions.get(&conn_id).map(|s| s.principal)
    }

    /// The channel a connection is currently subscribed to.
    pub fn subscription(&self, conn_id: ConnectionId) -> Option<Uuid> {
        self.sessions.get(&conn_id).and_then(|s| s.subscribed_channel)
    }

    /// Connection ids currently subscribed to a channel.
    pub fn subscribers_of(&self, channel_id: Uuid) -> HashSet<ConnectionId> {
        self.subscribers
            .get(&channel_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Outgoing senders for every connection subscribed to a channel.
    ///
    /// Senders are cloned out so fan-out delivery happens with no
    /// registry lock held.
    pub fn channel_senders(&self, channel_id: Uuid) -> Vec<mpsc::Sender<String>> {
        let ids = self.subscribers_of(channel_id);
        ids.into_iter()
            .filter_map(|conn_id| self.sessions.get(&conn_id).map(|s| s.sender.clone()))
            .collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry has no live connections.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove_subscriber(&self, channel_id: Uuid, conn_id: ConnectionId) {
        if let Some(mut set) = self.subscribers.get_mut(&channel_id) {
            set.remove(&conn_id);
            let now_empty = set.is_empty();
            drop(set);
            if now_empty {
                self.subscribers.remove_if(&channel_id, |_, s| s.is_empty());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn principal(user_id: i64) -> Principal {
        Principal {
            user_id,
            expires_at: Utc::now() + chrono::Duration::minutes(15),
        }
    }

    fn register(registry: &SessionRegistry, user_id: i64) -> ConnectionId {
        let conn_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        registry.register(conn_id, principal(user_id), tx);
        conn_id
    }

    #[test]
    fn register_and_resolve() {
        let registry = SessionRegistry::new();
        let conn = register(&registry, 42);

        assert_eq!(registry.principal(conn).map(|p| p.user_id), Some(42));
        assert_eq!(registry.subscription(conn), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn subscription_is_exclusive() {
        let registry = SessionRegistry::new();
        let conn = register(&registry, 42);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(registry.set_subscription(conn, Some(a)));
        assert!(registry.subscribers_of(a).contains(&conn));

        // Joining B evicts the A subscription.
        assert!(registry.set_subscription(conn, Some(b)));
        assert!(!registry.subscribers_of(a).contains(&conn));
        assert!(registry.subscribers_of(b).contains(&conn));
        assert_eq!(registry.subscription(conn), Some(b));
    }

    #[test]
    fn clear_subscription() {
        let registry = SessionRegistry::new();
        let conn = register(&registry, 42);
        let channel = Uuid::new_v4();

        registry.set_subscription(conn, Some(channel));
        registry.set_subscription(conn, None);

        assert_eq!(registry.subscription(conn), None);
        assert!(registry.subscribers_of(channel).is_empty());
    }

    #[test]
    fn rejoin_same_channel_keeps_subscription() {
        let registry = SessionRegistry::new();
        let conn = register(&registry, 42);
        let channel = Uuid::new_v4();

        registry.set_subscription(conn, Some(channel));
        registry.set_subscription(conn, Some(channel));

        assert!(registry.subscribers_of(channel).contains(&conn));
        assert_eq!(registry.subscription(conn), Some(channel));
    }

    #[test]
    fn set_subscription_on_unknown_connection() {
        let registry = SessionRegistry::new();
        let channel = Uuid::new_v4();

        assert!(!registry.set_subscription(Uuid::new_v4(), Some(channel)));
        assert!(registry.subscribers_of(channel).is_empty());
    }

    #[test]
    fn unregister_clears_subscription() {
        let registry = SessionRegistry::new();
        let conn = register(&registry, 42);
        let channel = Uuid::new_v4();
        registry.set_subscription(conn, Some(channel));

        registry.unregister(conn);

        assert!(registry.principal(conn).is_none());
        assert!(registry.subscribers_of(channel).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn channel_senders_tracks_membership() {
        let registry = SessionRegistry::new();
        let channel = Uuid::new_v4();

        let a = register(&registry, 1);
        let b = register(&registry, 2);
        let _c = register(&registry, 3); // never joins

        registry.set_subscription(a, Some(channel));
        registry.set_subscription(b, Some(channel));

        assert_eq!(registry.channel_senders(channel).len(), 2);

        registry.unregister(b);
        assert_eq!(registry.channel_senders(channel).len(), 1);
    }
}
