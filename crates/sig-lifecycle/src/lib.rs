//! Order lifecycle scheduler.
//!
//! For each newly created order, [`LifecycleScheduler::schedule`] spawns
//! one detached tokio task that drives the two deferred transitions:
//!
//! ```text
//! create ──(execute_after)──► pending → executed ──(close_after)──► executed → closed
//! ```
//!
//! Each attempt goes through the store's compare-and-set
//! [`transition`](sig_store::OrderStore::transition); a `StaleState`
//! result means another path already advanced the order and is swallowed
//! with a debug log: no error, no duplicate event. Successful
//! transitions are published to the [`Broadcaster`] before the task
//! proceeds. The task is fire-and-forget: it outlives the webhook
//! request that created the order, and a fault in one order's task
//! never touches another's.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sig_audit::ActivityLog;
use sig_broadcast::Broadcaster;
use sig_schemas::{LifecycleEvent, OrderStatus};
use sig_store::{OrderStore, TransitionError};
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// LifecycleDelays
// ---------------------------------------------------------------------------

/// Fixed lifecycle delays. `close_after` counts from the execute
/// transition, so an order closes `execute_after + close_after` after
/// creation.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleDelays {
    pub execute_after: Duration,
    pub close_after: Duration,
}

impl Default for LifecycleDelays {
    fn default() -> Self {
        Self {
            execute_after: Duration::from_secs(5),
            close_after: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleScheduler
// ---------------------------------------------------------------------------

pub struct LifecycleScheduler {
    store: Arc<OrderStore>,
    broadcaster: Arc<Broadcaster>,
    delays: LifecycleDelays,
    /// Orders that already have a lifecycle task; `schedule` is a no-op
    /// for ids seen before, so intake retries cannot double-schedule.
    scheduled: Mutex<HashSet<Uuid>>,
    /// Optional activity trail: one record per applied transition.
    audit: Option<Arc<Mutex<ActivityLog>>>,
}

impl LifecycleScheduler {
    pub fn new(
        store: Arc<OrderStore>,
        broadcaster: Arc<Broadcaster>,
        delays: LifecycleDelays,
    ) -> Self {
        Self {
            store,
            broadcaster,
            delays,
            scheduled: Mutex::new(HashSet::new()),
            audit: None,
        }
    }

    /// Attach an activity log; applied transitions append
    /// `order_executed` / `order_closed` records, best-effort.
    pub fn with_activity_log(mut self, log: Arc<Mutex<ActivityLog>>) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn delays(&self) -> LifecycleDelays {
        self.delays
    }

    /// Spawn the deferred execute/close pair for `order_id`. Returns
    /// `false` (and does nothing) if this order was already scheduled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, order_id: Uuid) -> bool {
        if !self
            .scheduled
            .lock()
            .expect("scheduler lock poisoned")
            .insert(order_id)
        {
            debug!(%order_id, "lifecycle already scheduled; ignoring");
            return false;
        }

        let store = Arc::clone(&self.store);
        let broadcaster = Arc::clone(&self.broadcaster);
        let audit = self.audit.clone();
        let delays = self.delays;

        tokio::spawn(async move {
            tokio::time::sleep(delays.execute_after).await;
            if !apply(
                &store,
                &broadcaster,
                &audit,
                order_id,
                OrderStatus::Pending,
                OrderStatus::Executed,
            ) {
                return;
            }

            tokio::time::sleep(delays.close_after).await;
            apply(
                &store,
                &broadcaster,
                &audit,
                order_id,
                OrderStatus::Executed,
                OrderStatus::Closed,
            );
        });
        true
    }
}

/// Apply one CAS-guarded transition and publish on success.
///
/// Returns `false` only when the task should stop early (the order does
/// not exist). A lost CAS is fine: the close attempt stays scheduled and
/// is itself CAS-guarded.
fn apply(
    store: &OrderStore,
    broadcaster: &Broadcaster,
    audit: &Option<Arc<Mutex<ActivityLog>>>,
    order_id: Uuid,
    expected: OrderStatus,
    new_status: OrderStatus,
) -> bool {
    match store.transition(order_id, expected, new_status) {
        Ok(order) => {
            let event = LifecycleEvent {
                order_id,
                owner_user_id: order.owner_user_id,
                new_status,
                ts_utc: Utc::now(),
                order,
            };
            let delivered = broadcaster.publish(&event);
            record_activity(audit, &event);
            debug!(
                %order_id,
                status = new_status.as_str(),
                delivered, "lifecycle transition applied"
            );
            true
        }
        Err(TransitionError::StaleState { actual, .. }) => {
            // Another path already advanced the order; expected, silent.
            debug!(
                %order_id,
                expected = expected.as_str(),
                actual = actual.as_str(),
                "lifecycle transition lost CAS; skipping"
            );
            true
        }
        Err(err @ TransitionError::NotFound { .. }) => {
            warn!(%order_id, %err, "lifecycle aborted: order missing");
            false
        }
        Err(err @ TransitionError::IllegalTransition { .. }) => {
            warn!(%order_id, %err, "lifecycle aborted: illegal transition");
            false
        }
    }
}

/// Best-effort activity append; an I/O fault must not stop the timers.
fn record_activity(audit: &Option<Arc<Mutex<ActivityLog>>>, event: &LifecycleEvent) {
    let Some(audit) = audit else { return };
    let action = match event.new_status {
        OrderStatus::Pending => "order_created",
        OrderStatus::Executed => "order_executed",
        OrderStatus::Closed => "order_closed",
    };
    let mut log = audit.lock().expect("activity log lock poisoned");
    if let Err(err) = log.append(
        Some(event.owner_user_id),
        action,
        json!({
            "order_id": event.order_id,
            "instrument": &event.order.instrument,
        }),
    ) {
        warn!(order_id = %event.order_id, %err, "activity log append failed");
    }
}

// ---------------------------------------------------------------------------
// Unit tests (paused-clock runtimes; no wall-clock sleeps)
// ---------------------------------------------------------------------------
