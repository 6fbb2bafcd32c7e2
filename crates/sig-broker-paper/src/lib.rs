//! Deterministic in-memory "paper" broker.
//!
//! Stands in for a real broker connection: placement always succeeds
//! and returns a synthetic broker order id derived from the order's own
//! UUID (`ORD-` + first 8 hex chars, uppercased). No randomness, no
//! timestamps, idempotent on repeat placement: re-placing the same
//! order returns the original report without mutation.

use std::collections::BTreeMap;

use sig_schemas::Order;
use tracing::info;
use uuid::Uuid;

/// Result of placing an order on the paper broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementReport {
    pub order_id: Uuid,
    /// Synthetic broker-side id, e.g. `ORD-9A3F01BC`.
    pub broker_order_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    /// Placements keyed by broker_order_id; BTreeMap iteration order is
    /// stable for inspection in tests.
    placements: BTreeMap<String, PlacementReport>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// "Execute" an order. Idempotent per order id.
    pub fn place(&mut self, order: &Order) -> PlacementReport {
        let broker_order_id = derive_broker_order_id(order.id);

        if let Some(existing) = self.placements.get(&broker_order_id) {
            return existing.clone();
        }

        let price_info = match &order.entry_price {
            Some(p) => format!("@{p}"),
            None => "@MARKET".to_string(),
        };
        info!(
            order_id = %order.id,
            action = order.action.as_str(),
            instrument = %order.instrument,
            price = %price_info,
            %broker_order_id,
            "paper broker placement"
        );

        let report = PlacementReport {
            order_id: order.id,
            broker_order_id: broker_order_id.clone(),
            message: format!(
                "{} {} {} placed",
                order.action.as_str(),
                order.instrument,
                price_info
            ),
        };
        self.placements.insert(broker_order_id, report.clone());
        report
    }

    pub fn placements(&self) -> Vec<PlacementReport> {
        self.placements.values().cloned().collect()
    }
}

fn derive_broker_order_id(order_id: Uuid) -> String {
    let hex = order_id.simple().to_string();
    format!("ORD-{}", hex[..8].to_ascii_uppercase())
}
