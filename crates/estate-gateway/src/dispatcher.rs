use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{error, trace};
use uuid::Uuid;

use estate_types::events::{RealtimeEvent, Topic};

/// Capacity of the fan-out channel. Receivers further behind than this skip
/// ahead and log a warning.
const BROADCAST_CAPACITY: usize = 1024;

/// An account change that open connections of that account must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountChange {
    pub user_id: Uuid,
    pub is_admin: bool,
    /// Banned or deleted: the account's sockets are closed.
    pub revoked: bool,
}

/// An event serialized once and tagged with the topics it belongs to.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topics: Vec<Topic>,
    pub json: Arc<str>,
    /// Set for private events: only this user and admins receive them.
    pub restricted_to: Option<Uuid>,
    pub account: Option<AccountChange>,
}

impl Envelope {
    /// Whether a connection with these subscriptions should receive it.
    pub fn matches(&self, subscriptions: &HashSet<Topic>) -> bool {
        self.topics.iter().any(|t| subscriptions.contains(t))
    }

    /// Whether `user_id` may see the payload at all.
    pub fn visible_to(&self, user_id: Uuid, is_admin: bool) -> bool {
        is_admin || self.restricted_to.is_none_or(|owner| owner == user_id)
    }
}

/// Fans realtime events out to every connected client.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Envelope>,

    /// Open connections: conn_id -> user_id
    connections: RwLock<HashMap<Uuid, Uuid>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to every published event. Topic filtering is done by the
    /// receiving connection.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event on its topics. Events without topics are dropped.
    pub fn publish(&self, event: RealtimeEvent) {
        let topics = event.topics();
        if topics.is_empty() {
            return;
        }

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize realtime event: {}", e);
                return;
            }
        };

        let account = match &event {
            RealtimeEvent::UserUpdate { user } => Some(AccountChange {
                user_id: user.id,
                is_admin: user.is_admin,
                revoked: user.is_banned,
            }),
            RealtimeEvent::UserDelete { user_id } => Some(AccountChange {
                user_id: *user_id,
                is_admin: false,
                revoked: true,
            }),
            _ => None,
        };

        trace!("Publishing on {:?}", topics);
        // No receivers is fine; nobody is listening.
        let _ = self.inner.broadcast_tx.send(Envelope {
            topics,
            json: json.into(),
            restricted_to: event.restricted_to(),
            account,
        });
    }

    /// Track a new connection. Returns its id.
    pub async fn register(&self, user_id: Uuid) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(conn_id, user_id);
        conn_id
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_matching_subscriptions_only() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let user_id = Uuid::new_v4();
        dispatcher.publish(RealtimeEvent::UserDelete { user_id });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.topics, vec![Topic::Admin]);
        assert!(envelope.json.contains("UserDelete"));

        let admin: HashSet<Topic> = [Topic::Admin].into_iter().collect();
        let own: HashSet<Topic> = [Topic::User { user_id }].into_iter().collect();
        assert!(envelope.matches(&admin));
        assert!(!envelope.matches(&own));
        assert_eq!(
            envelope.account,
            Some(AccountChange {
                user_id,
                is_admin: false,
                revoked: true,
            })
        );
    }

    #[test]
    fn restricted_envelopes_reach_owner_and_admins() {
        let owner = Uuid::new_v4();
        let envelope = Envelope {
            topics: vec![Topic::Property { property_id: Uuid::new_v4() }],
            json: "{}".into(),
            restricted_to: Some(owner),
            account: None,
        };
        assert!(envelope.visible_to(owner, false));
        assert!(envelope.visible_to(Uuid::new_v4(), true));
        assert!(!envelope.visible_to(Uuid::new_v4(), false));

        let public = Envelope { restricted_to: None, ..envelope };
        assert!(public.visible_to(Uuid::new_v4(), false));
    }

    #[tokio::test]
    async fn topicless_events_are_not_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish(RealtimeEvent::Ready { user_id: Uuid::new_v4() });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connections_are_tracked() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.register(Uuid::new_v4()).await;
        let b = dispatcher.register(Uuid::new_v4()).await;
        assert_eq!(dispatcher.connection_count().await, 2);
        dispatcher.unregister(a).await;
        dispatcher.unregister(b).await;
        assert_eq!(dispatcher.connection_count().await, 0);
    }
}
