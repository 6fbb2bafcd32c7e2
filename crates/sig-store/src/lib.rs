//! In-memory order store with compare-and-set lifecycle transitions.
//!
//! # Design
//!
//! The store is the sole owner of every [`Order`]; collaborators hold
//! ids, never live references. Status changes go through
//! [`OrderStore::transition`], which enforces two invariants:
//!
//! 1. **Forward-only.** The requested status must be the direct
//!    successor of the expected one (`pending → executed → closed`).
//! 2. **Compare-and-set.** The change applies only if the stored status
//!    still equals `expected`. A lost race returns
//!    [`TransitionError::StaleState`] and leaves the order untouched;
//!    duplicate timer firings therefore degrade to silent no-ops at the
//!    caller.
//!
//! All methods take `&self`; a single `RwLock` guards the table and the
//! per-owner index, and every critical section is short and free of
//! awaits, so the store is safe to share across timer tasks and HTTP
//! handlers as an `Arc<OrderStore>`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use sig_schemas::{Order, OrderStatus, Signal};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure applying a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The stored status no longer equals the expected one. Expected
    /// under duplicate/racing scheduling; callers swallow it.
    StaleState {
        order_id: Uuid,
        expected: OrderStatus,
        actual: OrderStatus,
    },
    /// The requested change is not the direct forward successor of the
    /// expected status.
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
    /// No order with this id exists.
    NotFound { order_id: Uuid },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::StaleState {
                order_id,
                expected,
                actual,
            } => write!(
                f,
                "order {order_id}: expected status '{}' but found '{}'",
                expected.as_str(),
                actual.as_str()
            ),
            TransitionError::IllegalTransition { from, to } => write!(
                f,
                "illegal transition: '{}' -> '{}'",
                from.as_str(),
                to.as_str()
            ),
            TransitionError::NotFound { order_id } => {
                write!(f, "order {order_id} not found")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Lookup failure for read paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub order_id: Uuid,
}

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order {} not found", self.order_id)
    }
}

impl std::error::Error for NotFound {}

// ---------------------------------------------------------------------------
// OrderStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Tables {
    /// Order records keyed by id, tagged with a creation sequence so
    /// per-owner listings have a stable order even for equal timestamps.
    orders: HashMap<Uuid, (Order, u64)>,
    by_owner: HashMap<Uuid, Vec<Uuid>>,
    next_seq: u64,
}

/// In-memory order table. See the module docs for the locking and
/// compare-and-set contract.
#[derive(Debug)]
pub struct OrderStore {
    tables: RwLock<Tables>,
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                orders: HashMap::new(),
                by_owner: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Create a new `pending` order from a parsed signal.
    pub fn create(&self, owner_user_id: Uuid, signal: &Signal) -> Order {
        let order = Order {
            id: Uuid::new_v4(),
            owner_user_id,
            action: signal.action,
            instrument: signal.instrument.clone(),
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            status: OrderStatus::Pending,
            broker_order_id: None,
            created_at: Utc::now(),
            executed_at: None,
            closed_at: None,
        };

        let mut t = self.tables.write().expect("order store lock poisoned");
        let seq = t.next_seq;
        t.next_seq += 1;
        t.orders.insert(order.id, (order.clone(), seq));
        t.by_owner.entry(owner_user_id).or_default().push(order.id);
        order
    }

    /// Apply `expected -> new_status` if and only if the stored status
    /// still equals `expected`. Returns the updated order snapshot.
    ///
    /// # Errors
    /// - [`TransitionError::IllegalTransition`] if `new_status` is not
    ///   the direct successor of `expected` (checked before touching
    ///   the table, so a bad request can never corrupt state).
    /// - [`TransitionError::NotFound`] for unknown ids.
    /// - [`TransitionError::StaleState`] when the CAS precondition
    ///   fails; the stored order is unchanged.
    pub fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<Order, TransitionError> {
        if expected.next() != Some(new_status) {
            return Err(TransitionError::IllegalTransition {
                from: expected,
                to: new_status,
            });
        }

        let mut t = self.tables.write().expect("order store lock poisoned");
        let (order, _) = t
            .orders
            .get_mut(&order_id)
            .ok_or(TransitionError::NotFound { order_id })?;

        if order.status != expected {
            return Err(TransitionError::StaleState {
                order_id,
                expected,
                actual: order.status,
            });
        }

        let now = Utc::now();
        order.status = new_status;
        match new_status {
            OrderStatus::Executed => order.executed_at = Some(now),
            OrderStatus::Closed => order.closed_at = Some(now),
            OrderStatus::Pending => {}
        }
        Ok(order.clone())
    }

    /// Record the broker's synthetic order id after placement.
    pub fn attach_broker_order_id(
        &self,
        order_id: Uuid,
        broker_order_id: impl Into<String>,
    ) -> Result<Order, NotFound> {
        let mut t = self.tables.write().expect("order store lock poisoned");
        let (order, _) = t.orders.get_mut(&order_id).ok_or(NotFound { order_id })?;
        order.broker_order_id = Some(broker_order_id.into());
        Ok(order.clone())
    }

    pub fn get(&self, order_id: Uuid) -> Result<Order, NotFound> {
        let t = self.tables.read().expect("order store lock poisoned");
        t.orders
            .get(&order_id)
            .map(|(o, _)| o.clone())
            .ok_or(NotFound { order_id })
    }

    /// All orders for one owner, `created_at` ascending (creation
    /// sequence breaks timestamp ties).
    pub fn list_by_owner(&self, owner_user_id: Uuid) -> Vec<Order> {
        let t = self.tables.read().expect("order store lock poisoned");
        let mut rows: Vec<(Order, u64)> = t
            .by_owner
            .get(&owner_user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| t.orders.get(id).cloned())
            .collect();
        rows.sort_by_key(|(o, seq)| (o.created_at, *seq));
        rows.into_iter().map(|(o, _)| o).collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
