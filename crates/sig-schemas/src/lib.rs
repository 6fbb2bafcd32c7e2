use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

/// Lifecycle status of an order. Transitions are strictly forward:
/// `Pending -> Executed -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Executed,
    Closed,
}

impl OrderStatus {
    /// The single legal next status, or `None` from the terminal state.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Executed),
            OrderStatus::Executed => Some(OrderStatus::Closed),
            OrderStatus::Closed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Executed => "executed",
            OrderStatus::Closed => "closed",
        }
    }
}

/// A parsed trading instruction. Ephemeral: produced by the parser,
/// consumed by order creation, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub action: Action,
    /// Uppercased symbol, e.g. `EURUSD`, `BTCUSD`.
    pub instrument: String,
    /// `None` means a market order.
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub action: Action,
    pub instrument: String,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: OrderStatus,
    /// Synthetic id returned by the paper broker on placement.
    pub broker_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on entering `executed`.
    pub executed_at: Option<DateTime<Utc>>,
    /// Set exactly once, on entering `closed`.
    pub closed_at: Option<DateTime<Utc>>,
}

/// One lifecycle transition, pushed to every subscriber of the owning
/// user. Carries a snapshot of the order as of the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub order_id: Uuid,
    pub owner_user_id: Uuid,
    pub new_status: OrderStatus,
    pub ts_utc: DateTime<Utc>,
    pub order: Order,
}

impl LifecycleEvent {
    /// Dotted event name, e.g. `order.executed`.
    pub fn kind(&self) -> &'static str {
        match self.new_status {
            OrderStatus::Pending => "order.created",
            OrderStatus::Executed => "order.executed",
            OrderStatus::Closed => "order.closed",
        }
    }
}
