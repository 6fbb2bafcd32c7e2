//! Request and response types for all sig-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use sig_auth::BrokerAccount;
use sig_schemas::OrderStatus;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    /// e.g. "MetaTrader5", "cTrader".
    pub broker_name: String,
    /// Broker-side account identifier.
    pub account_id: String,
}

/// Returned once, at registration. `api_key` is never shown again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountResponse {
    pub message: String,
    pub api_key: String,
    pub user_id: Uuid,
    pub username: String,
    pub broker_account: BrokerAccount,
}

// ---------------------------------------------------------------------------
// /v1/webhook/signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWebhookRequest {
    pub signal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAcceptedResponse {
    pub message: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// 422 body identifying which grammar rule the signal violated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRejectedResponse {
    pub error: String,
    /// Stable rule name, e.g. `missing_action`, `invalid_stop_loss`.
    pub rule: String,
}

// ---------------------------------------------------------------------------
// Generic error body (401 / 400 / 404)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
