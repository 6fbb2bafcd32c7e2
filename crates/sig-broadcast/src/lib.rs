//! Per-user fan-out of lifecycle events to real-time subscribers.
//!
//! Each subscriber gets its own unbounded channel; [`Broadcaster::publish`]
//! walks the owning user's subscriber set and delivers a clone of the
//! event to every live connection. A connection whose receiver is gone
//! is pruned during publish; one broken subscriber never blocks its
//! siblings and never surfaces an error to the publisher.
//!
//! There is no replay: a subscriber only observes transitions published
//! after it subscribed. Clients wanting the current state query the
//! order store on connect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sig_schemas::LifecycleEvent;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Identifies one live subscription. Returned by [`Broadcaster::subscribe`]
/// and consumed by [`Broadcaster::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    user_id: Uuid,
    sub_id: u64,
}

impl SubscriptionHandle {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Concurrency-safe subscription table: `user_id -> {sub_id -> sender}`.
///
/// The mutex guards only map bookkeeping; sends on unbounded channels
/// never block, so `publish` holds the lock for the duration of the
/// fan-out without stalling callers.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<Uuid, HashMap<u64, mpsc::UnboundedSender<LifecycleEvent>>>>,
    next_sub_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection interested in `user_id`'s orders. Dropping
    /// the returned receiver is equivalent to a disconnect: the entry is
    /// pruned on the next publish to that user.
    pub fn subscribe(
        &self,
        user_id: Uuid,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("broadcaster lock poisoned")
            .entry(user_id)
            .or_default()
            .insert(sub_id, tx);
        (SubscriptionHandle { user_id, sub_id }, rx)
    }

    /// Remove a subscription. Idempotent: unknown handles are a no-op.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut subs = self.subscribers.lock().expect("broadcaster lock poisoned");
        if let Some(per_user) = subs.get_mut(&handle.user_id) {
            per_user.remove(&handle.sub_id);
            if per_user.is_empty() {
                subs.remove(&handle.user_id);
            }
        }
    }

    /// Deliver `event` to every live subscriber of its owning user.
    /// Returns the number of connections the event reached. Dead
    /// connections are pruned, never reported.
    pub fn publish(&self, event: &LifecycleEvent) -> usize {
        let mut subs = self.subscribers.lock().expect("broadcaster lock poisoned");
        let Some(per_user) = subs.get_mut(&event.owner_user_id) else {
            return 0;
        };

        let mut delivered = 0;
        per_user.retain(|sub_id, tx| match tx.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(
                    user_id = %event.owner_user_id,
                    sub_id, "dropping closed subscriber connection"
                );
                false
            }
        });
        if per_user.is_empty() {
            subs.remove(&event.owner_user_id);
        }
        delivered
    }

    /// Number of live subscriptions for one user (tests / diagnostics).
    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.subscribers
            .lock()
            .expect("broadcaster lock poisoned")
            .get(&user_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sig_schemas::{Action, Order, OrderStatus};

    fn event_for(user_id: Uuid, status: OrderStatus) -> LifecycleEvent {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            owner_user_id: user_id,
            action: Action::Buy,
            instrument: "EURUSD".to_string(),
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            status,
            broker_order_id: None,
            created_at: now,
            executed_at: None,
            closed_at: None,
        };
        LifecycleEvent {
            order_id: order.id,
            owner_user_id: user_id,
            new_status: status,
            ts_utc: now,
            order,
        }
    }

    #[test]
    fn publish_reaches_every_subscriber_of_the_owner() {
        let bc = Broadcaster::new();
        let user = Uuid::new_v4();
        let (_h1, mut rx1) = bc.subscribe(user);
        let (_h2, mut rx2) = bc.subscribe(user);

        let ev = event_for(user, OrderStatus::Executed);
        assert_eq!(bc.publish(&ev), 2);
        assert_eq!(rx1.try_recv().unwrap().order_id, ev.order_id);
        assert_eq!(rx2.try_recv().unwrap().order_id, ev.order_id);
    }

    #[test]
    fn publish_never_crosses_users() {
        let bc = Broadcaster::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_ha, mut rx_alice) = bc.subscribe(alice);
        let (_hb, mut rx_bob) = bc.subscribe(bob);

        assert_eq!(bc.publish(&event_for(alice, OrderStatus::Executed)), 1);
        assert!(rx_alice.try_recv().is_ok());
        assert!(rx_bob.try_recv().is_err(), "bob must see nothing");
    }

    #[test]
    fn dead_connection_is_pruned_and_siblings_still_receive() {
        let bc = Broadcaster::new();
        let user = Uuid::new_v4();
        let (_h1, rx1) = bc.subscribe(user);
        let (_h2, mut rx2) = bc.subscribe(user);
        drop(rx1); // simulated disconnect

        let ev = event_for(user, OrderStatus::Executed);
        assert_eq!(bc.publish(&ev), 1);
        assert_eq!(rx2.try_recv().unwrap().order_id, ev.order_id);
        assert_eq!(bc.subscriber_count(user), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bc = Broadcaster::new();
        let user = Uuid::new_v4();
        let (handle, _rx) = bc.subscribe(user);
        bc.unsubscribe(&handle);
        bc.unsubscribe(&handle);
        assert_eq!(bc.subscriber_count(user), 0);
        assert_eq!(bc.publish(&event_for(user, OrderStatus::Closed)), 0);
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let bc = Broadcaster::new();
        let user = Uuid::new_v4();
        bc.publish(&event_for(user, OrderStatus::Executed));

        let (_h, mut rx) = bc.subscribe(user);
        assert!(rx.try_recv().is_err(), "past events are not replayed");

        let ev = event_for(user, OrderStatus::Closed);
        bc.publish(&ev);
        assert_eq!(rx.try_recv().unwrap().new_status, OrderStatus::Closed);
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let bc = Broadcaster::new();
        let user = Uuid::new_v4();
        let (_h, mut rx) = bc.subscribe(user);

        bc.publish(&event_for(user, OrderStatus::Executed));
        bc.publish(&event_for(user, OrderStatus::Closed));

        assert_eq!(rx.try_recv().unwrap().new_status, OrderStatus::Executed);
        assert_eq!(rx.try_recv().unwrap().new_status, OrderStatus::Closed);
    }
}
