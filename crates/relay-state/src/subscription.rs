//! Solver subscription registry.
//!
//! Subscriptions are grouped by owner (one connected client). The backing
//! map is sharded, so fan-out in [`SubscriptionRegistry::notify`] only takes
//! short per-shard read locks and never waits on subscribe/unsubscribe churn
//! of unrelated owners.

use std::sync::Arc;

use dashmap::DashMap;
use relay_core::{Notification, RelayError, Result, SubscriptionType};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::ConnectionHandle;

/// Slots in each subscription's notification queue.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 10_000;

/// Identity of the client owning a set of subscriptions.
pub type OwnerId = String;

/// Receiving half of a subscription, held by the delivery loop.
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub subscription_type: SubscriptionType,
    receiver: mpsc::Receiver<Arc<Notification>>,
}

impl Subscription {
    /// Next queued notification. `None` once the subscription was removed
    /// from the registry and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        self.receiver.recv().await
    }

    /// Number of notifications currently waiting.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

struct SubscriptionEntry {
    id: Uuid,
    subscription_type: SubscriptionType,
    sender: mpsc::Sender<Arc<Notification>>,
    connection: ConnectionHandle,
}

/// Registry of active subscriptions with best-effort fan-out.
pub struct SubscriptionRegistry {
    owners: DashMap<OwnerId, Vec<SubscriptionEntry>>,
    queue_capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_queue_capacity(NOTIFICATION_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            owners: DashMap::new(),
            queue_capacity,
        }
    }

    /// Register a new subscription for `owner`.
    ///
    /// Fails if the type is unknown or the owner already has a subscription
    /// of that type.
    pub fn subscribe(
        &self,
        owner: &str,
        subscription_type: &str,
        connection: ConnectionHandle,
    ) -> Result<Subscription> {
        let subscription_type: SubscriptionType = subscription_type.parse()?;

        // The entry guard serializes membership changes for this owner.
        let mut subscriptions = self.owners.entry(owner.to_string()).or_default();

        if let Some(existing) = subscriptions
            .iter()
            .find(|s| s.subscription_type == subscription_type)
        {
            return Err(RelayError::DuplicateSubscription {
                subscription_type: subscription_type.to_string(),
                id: existing.id.to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();

        subscriptions.push(SubscriptionEntry {
            id,
            subscription_type,
            sender,
            connection,
        });

        debug!(owner, subscription_id = %id, %subscription_type, "subscription registered");

        Ok(Subscription {
            id,
            subscription_type,
            receiver,
        })
    }

    /// Remove a subscription, closing its queue.
    pub fn unsubscribe(&self, owner: &str, subscription_id: &str) -> Result<()> {
        let not_found = || RelayError::SubscriptionNotFound(subscription_id.to_string());
        let id = Uuid::parse_str(subscription_id).map_err(|_| not_found())?;

        let mut subscriptions = self.owners.get_mut(owner).ok_or_else(not_found)?;
        let position = subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(not_found)?;

        // Dropping the entry drops its sender, which closes the queue while
        // the shard is still write-locked.
        subscriptions.remove(position);
        let now_empty = subscriptions.is_empty();
        drop(subscriptions);

        if now_empty {
            self.owners.remove_if(owner, |_, subs| subs.is_empty());
        }

        debug!(owner, subscription_id, "subscription removed");
        Ok(())
    }

    /// Fan a notification out to every subscription of its type.
    ///
    /// Never blocks: a full queue drops the notification for that subscriber.
    /// Returns the number of queues the notification was placed on.
    pub fn notify(&self, notification: Notification) -> usize {
        let Some(subscription_type) = notification.subscription_type() else {
            return 0;
        };

        let notification = Arc::new(notification);
        let mut delivered = 0;

        for owner in self.owners.iter() {
            for subscription in owner
                .value()
                .iter()
                .filter(|s| s.subscription_type == subscription_type)
            {
                match subscription.sender.try_send(Arc::clone(&notification)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            owner = owner.key().as_str(),
                            subscription_id = %subscription.id,
                            "notification channel for subscription is full, dropping notification"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(
                            subscription_id = %subscription.id,
                            "subscriber stopped receiving, skipping notification"
                        );
                    }
                }
            }
        }

        delivered
    }

    /// Terminate every subscribed connection. Used once, at shutdown.
    pub fn close(&self) {
        for owner in self.owners.iter() {
            for subscription in owner.value() {
                subscription.connection.close();
            }
        }
        self.owners.clear();
    }

    /// Total number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.owners.iter().map(|owner| owner.value().len()).sum()
    }

    /// Number of owners holding at least one subscription.
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{IntentNotification, SolutionNotification, SolverSolution};
    use std::time::Duration;

    fn intent(id: &str) -> Notification {
        Notification::Intent(IntentNotification {
            dapp_address: "0xdapp".into(),
            sender_address: "0xsender".into(),
            intent_id: id.into(),
            intent: b"payload".to_vec(),
            timestamp: None,
        })
    }

    fn intent_id(notification: &Notification) -> &str {
        match notification {
            Notification::Intent(n) => &n.intent_id,
            Notification::Solution(n) => &n.intent_id,
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let registry = SubscriptionRegistry::new();

        let sub = registry
            .subscribe("10.0.0.1:5000", "intent", ConnectionHandle::new())
            .unwrap();
        assert_eq!(sub.subscription_type, SubscriptionType::Intent);
        assert_eq!(registry.subscription_count(), 1);

        registry
            .unsubscribe("10.0.0.1:5000", &sub.id.to_string())
            .unwrap();
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(registry.owner_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_subscription_type() {
        let registry = SubscriptionRegistry::new();

        let err = registry
            .subscribe("owner", "blocks", ConnectionHandle::new())
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidSubscriptionType { .. }));
        assert_eq!(registry.owner_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let registry = SubscriptionRegistry::new();
        let first = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        let err = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap_err();
        assert_eq!(
            err,
            RelayError::DuplicateSubscription {
                subscription_type: "intent".into(),
                id: first.id.to_string(),
            }
        );

        // A different owner may hold the same type.
        registry
            .subscribe("other", "intent", ConnectionHandle::new())
            .unwrap();
        assert_eq!(registry.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let first = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();
        registry.unsubscribe("owner", &first.id.to_string()).unwrap();

        let second = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_leaves_others_intact() {
        let registry = SubscriptionRegistry::new();
        let sub = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        let unknown = Uuid::new_v4().to_string();
        assert_eq!(
            registry.unsubscribe("owner", &unknown),
            Err(RelayError::SubscriptionNotFound(unknown.clone()))
        );
        assert!(matches!(
            registry.unsubscribe("owner", "not-a-uuid"),
            Err(RelayError::SubscriptionNotFound(_))
        ));
        // Another owner's id is not ours to remove.
        assert!(registry
            .unsubscribe("someone-else", &sub.id.to_string())
            .is_err());

        assert_eq!(registry.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_notify_delivers_in_order() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        assert_eq!(registry.notify(intent("a")), 1);
        assert_eq!(registry.notify(intent("b")), 1);

        assert_eq!(intent_id(&sub.recv().await.unwrap()), "a");
        assert_eq!(intent_id(&sub.recv().await.unwrap()), "b");
    }

    #[tokio::test]
    async fn test_notify_fans_out_to_all_owners() {
        let registry = SubscriptionRegistry::new();
        let mut first = registry
            .subscribe("one", "intent", ConnectionHandle::new())
            .unwrap();
        let mut second = registry
            .subscribe("two", "intent", ConnectionHandle::new())
            .unwrap();

        assert_eq!(registry.notify(intent("abc")), 2);

        assert_eq!(intent_id(&first.recv().await.unwrap()), "abc");
        assert_eq!(intent_id(&second.recv().await.unwrap()), "abc");
    }

    #[tokio::test]
    async fn test_unclassified_notifications_are_ignored() {
        let registry = SubscriptionRegistry::new();
        let sub = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        let solution = Notification::Solution(SolutionNotification {
            intent_id: "abc".into(),
            solution: SolverSolution::new(serde_json::json!({})),
        });

        assert_eq!(registry.notify(solution), 0);
        assert_eq!(sub.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest_without_blocking() {
        let registry = SubscriptionRegistry::with_queue_capacity(2);
        let mut sub = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        registry.notify(intent("1"));
        registry.notify(intent("2"));

        let overflow = tokio::time::timeout(Duration::from_secs(1), async {
            registry.notify(intent("3"))
        })
        .await
        .unwrap();
        assert_eq!(overflow, 0);

        assert_eq!(intent_id(&sub.recv().await.unwrap()), "1");
        assert_eq!(intent_id(&sub.recv().await.unwrap()), "2");
        assert_eq!(sub.pending(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry
            .subscribe("owner", "intent", ConnectionHandle::new())
            .unwrap();

        registry.notify(intent("queued"));
        registry.unsubscribe("owner", &sub.id.to_string()).unwrap();

        // Already queued items drain, then the stream ends.
        assert_eq!(intent_id(&sub.recv().await.unwrap()), "queued");
        assert!(sub.recv().await.is_none());
        assert_eq!(registry.notify(intent("late")), 0);
    }

    #[tokio::test]
    async fn test_close_terminates_connections() {
        let registry = SubscriptionRegistry::new();
        let connection = ConnectionHandle::new();
        let mut sub = registry
            .subscribe("owner", "intent", connection.clone())
            .unwrap();

        registry.close();

        assert!(connection.is_closed());
        assert!(sub.recv().await.is_none());
        assert_eq!(registry.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_never_duplicates() {
        let registry = Arc::new(SubscriptionRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .subscribe("owner", "intent", ConnectionHandle::new())
                        .is_ok()
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(registry.subscription_count(), 1);
    }
}
