//! Axum router and all HTTP handlers for sig-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. All handlers are `pub(crate)` so the
//! scenario tests in `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        CreateAccountRequest, CreateAccountResponse, ErrorResponse, HealthResponse,
        SignalAcceptedResponse, SignalRejectedResponse, SignalWebhookRequest,
    },
    state::AppState,
    ws,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/accounts", post(create_account))
        .route("/v1/webhook/signal", post(receive_signal))
        .route("/v1/orders", get(list_orders))
        .route("/v1/orders/:order_id", get(get_order))
        .route("/v1/orders/stream/:user_id", get(ws::orders_stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Auth helper
// ---------------------------------------------------------------------------

/// Resolve the caller from the `x-api-key` header, or produce the 401
/// response the handler should return as-is.
fn authenticate(st: &AppState, headers: &HeaderMap) -> Result<Uuid, Response> {
    let raw_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    st.registry.authenticate(raw_key).map_err(|err| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response()
    })
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/accounts
// ---------------------------------------------------------------------------

/// Register a user and link a broker account. The response carries the
/// raw API key exactly once.
pub(crate) async fn create_account(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    for (field, value) in [
        ("username", &req.username),
        ("broker_name", &req.broker_name),
        ("account_id", &req.account_id),
    ] {
        if value.trim().is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("{field} must not be empty"),
                }),
            )
                .into_response();
        }
    }

    let registered = match st
        .registry
        .register(&req.username, &req.broker_name, &req.account_id)
    {
        Ok(r) => r,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    info!(username = %registered.user.username, user_id = %registered.user.user_id, "account created");
    st.log_activity(
        Some(registered.user.user_id),
        "account_created",
        json!({
            "broker_name": &registered.user.broker_account.broker_name,
            "account_id": &registered.user.broker_account.account_id,
        }),
    );

    (
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            message: "Account created successfully.".to_string(),
            api_key: registered.api_key,
            user_id: registered.user.user_id,
            username: registered.user.username,
            broker_account: registered.user.broker_account,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/webhook/signal
// ---------------------------------------------------------------------------

/// Webhook intake: authenticate, parse, create the order, place it on
/// the paper broker, and schedule the lifecycle. Responds immediately;
/// the deferred transitions run off this request's path.
pub(crate) async fn receive_signal(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SignalWebhookRequest>,
) -> Response {
    let user_id = match authenticate(&st, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    st.log_activity(
        Some(user_id),
        "signal_received",
        json!({ "raw_signal": &req.signal }),
    );

    let signal = match sig_parser::parse(&req.signal) {
        Ok(s) => s,
        Err(err) => {
            st.log_activity(
                Some(user_id),
                "signal_rejected",
                json!({ "raw_signal": &req.signal, "reason": err.to_string() }),
            );
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(SignalRejectedResponse {
                    error: err.to_string(),
                    rule: err.rule().to_string(),
                }),
            )
                .into_response();
        }
    };

    let order = st.store.create(user_id, &signal);
    st.log_activity(
        Some(user_id),
        "order_created",
        json!({ "order_id": order.id, "action": signal.action.as_str(), "instrument": signal.instrument }),
    );

    let report = st
        .broker
        .lock()
        .expect("paper broker lock poisoned")
        .place(&order);
    // The order was just created; a missing id here cannot happen.
    let _ = st
        .store
        .attach_broker_order_id(order.id, &report.broker_order_id);
    st.log_activity(
        Some(user_id),
        "order_submitted",
        json!({ "order_id": order.id, "broker_order_id": report.broker_order_id }),
    );

    st.scheduler.schedule(order.id);
    info!(order_id = %order.id, instrument = %order.instrument, "signal accepted");

    (
        StatusCode::OK,
        Json(SignalAcceptedResponse {
            message: "Signal received. Order is being processed.".to_string(),
            order_id: order.id,
            status: order.status,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/orders
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user_id = match authenticate(&st, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    (StatusCode::OK, Json(st.store.list_by_owner(user_id))).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/orders/{order_id}
// ---------------------------------------------------------------------------

/// Single-order lookup, scoped to the caller: an order owned by another
/// user is indistinguishable from a missing one.
pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Response {
    let user_id = match authenticate(&st, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match st.store.get(order_id) {
        Ok(order) if order.owner_user_id == user_id => {
            (StatusCode::OK, Json(order)).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Order not found.".to_string(),
            }),
        )
            .into_response(),
    }
}
