//! Shared runtime state for sig-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything inside
//! is concurrency-safe on its own (`Arc`-shared stores, short std
//! mutexes around the paper broker and activity log); this module owns
//! nothing async itself.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use sig_audit::ActivityLog;
use sig_auth::AccountRegistry;
use sig_broadcast::Broadcaster;
use sig_broker_paper::PaperBroker;
use sig_lifecycle::{LifecycleDelays, LifecycleScheduler};
use sig_store::OrderStore;
use tracing::warn;
use uuid::Uuid;

/// Static build metadata included in health responses.
#[derive(Clone, Copy, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Shared across all Axum handlers behind an `Arc`.
pub struct AppState {
    pub store: Arc<OrderStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub scheduler: LifecycleScheduler,
    pub registry: AccountRegistry,
    pub broker: Mutex<PaperBroker>,
    /// `None` disables activity logging (the default in tests). Shared
    /// with the scheduler, which records applied transitions.
    pub audit: Option<Arc<Mutex<ActivityLog>>>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(delays: LifecycleDelays, audit: Option<ActivityLog>) -> Self {
        let store = Arc::new(OrderStore::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let audit = audit.map(|log| Arc::new(Mutex::new(log)));

        let mut scheduler =
            LifecycleScheduler::new(Arc::clone(&store), Arc::clone(&broadcaster), delays);
        if let Some(log) = &audit {
            scheduler = scheduler.with_activity_log(Arc::clone(log));
        }

        Self {
            store,
            broadcaster,
            scheduler,
            registry: AccountRegistry::new(),
            broker: Mutex::new(PaperBroker::new()),
            audit,
            build: BuildInfo {
                service: "sig-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }

    /// Default delays, no activity log.
    pub fn with_defaults() -> Self {
        Self::new(LifecycleDelays::default(), None)
    }

    /// Best-effort activity append. Auditing must never fail a request:
    /// an I/O fault is logged and swallowed.
    pub fn log_activity(&self, user_id: Option<Uuid>, action: &str, details: Value) {
        let Some(audit) = &self.audit else { return };
        let mut log = audit.lock().expect("activity log lock poisoned");
        if let Err(err) = log.append(user_id, action, details) {
            warn!(action, %err, "activity log append failed");
        }
    }
}
