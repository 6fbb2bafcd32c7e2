//! End-to-end webhook → lifecycle scenarios on a paused clock.
//!
//! A signal accepted over the webhook must return immediately while its
//! order advances `pending → executed → closed` on background timers,
//! with exactly one broadcast event per transition. The runtime clock is
//! paused, so the default 5 s + 5 s delays cost nothing.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sig_daemon::{routes, state};
use tower::ServiceExt;

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn post_signal(api_key: &str, signal: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/webhook/signal")
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .body(axum::body::Body::from(
            serde_json::json!({ "signal": signal }).to_string(),
        ))
        .unwrap()
}

fn get_authed(uri: &str, api_key: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-api-key", api_key)
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn register(st: &Arc<state::AppState>, username: &str) -> (uuid::Uuid, String) {
    let req = Request::builder()
        .method("POST")
        .uri("/v1/accounts")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({
                "username": username,
                "broker_name": "MetaTrader5",
                "account_id": "MT-1001",
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = call(routes::build_router(Arc::clone(st)), req).await;
    assert_eq!(status, StatusCode::CREATED);
    let json = parse_json(body);
    (
        json["user_id"].as_str().unwrap().parse().unwrap(),
        json["api_key"].as_str().unwrap().to_string(),
    )
}

#[tokio::test(start_paused = true)]
async fn order_executes_then_closes_and_subscriber_sees_two_events() {
    let st = Arc::new(state::AppState::with_defaults());
    let (user_id, key) = register(&st, "alice").await;

    // Subscribe before the webhook fires, as a real-time client would.
    let (_handle, mut rx) = st.broadcaster.subscribe(user_id);

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_signal(&key, "BUY EURUSD @1.0850 SL 1.0820 TP 1.0900"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let order_id: uuid::Uuid = parse_json(body)["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    // The webhook returned while the order is still pending.
    assert_eq!(
        st.store.get(order_id).unwrap().status,
        sig_schemas::OrderStatus::Pending
    );

    let executed = rx.recv().await.unwrap();
    assert_eq!(executed.order_id, order_id);
    assert_eq!(executed.new_status, sig_schemas::OrderStatus::Executed);
    assert!(executed.order.executed_at.is_some());

    let closed = rx.recv().await.unwrap();
    assert_eq!(closed.order_id, order_id);
    assert_eq!(closed.new_status, sig_schemas::OrderStatus::Closed);
    assert!(closed.order.closed_at.is_some());

    // Exactly two events; nothing further ever arrives.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());

    // The query surface agrees with the final state.
    let (_, body) = call(
        routes::build_router(Arc::clone(&st)),
        get_authed(&format!("/v1/orders/{order_id}"), &key),
    )
    .await;
    let order = parse_json(body);
    assert_eq!(order["status"], "closed");
    assert!(!order["executed_at"].is_null());
    assert!(!order["closed_at"].is_null());
}

#[tokio::test(start_paused = true)]
async fn events_are_scoped_to_the_owning_user() {
    let st = Arc::new(state::AppState::with_defaults());
    let (alice_id, alice_key) = register(&st, "alice").await;
    let (bob_id, _bob_key) = register(&st, "bob").await;

    let (_ha, mut alice_rx) = st.broadcaster.subscribe(alice_id);
    let (_hb, mut bob_rx) = st.broadcaster.subscribe(bob_id);

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_signal(&alice_key, "SELL BTCUSD SL 60000 TP 70000"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        alice_rx.recv().await.unwrap().new_status,
        sig_schemas::OrderStatus::Executed
    );
    assert_eq!(
        alice_rx.recv().await.unwrap().new_status,
        sig_schemas::OrderStatus::Closed
    );

    // Bob's subscription never observes alice's order.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn concurrent_signals_each_run_their_own_lifecycle() {
    let st = Arc::new(state::AppState::with_defaults());
    let (user_id, key) = register(&st, "alice").await;
    let (_h, mut rx) = st.broadcaster.subscribe(user_id);

    let mut order_ids = Vec::new();
    for signal in ["BUY EURUSD", "SELL BTCUSD", "BUY XAUUSD TP 2400"] {
        let (status, body) = call(
            routes::build_router(Arc::clone(&st)),
            post_signal(&key, signal),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id: uuid::Uuid = parse_json(body)["order_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        order_ids.push(id);
    }

    // Let every timer fire.
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Two events per order, and each order ends closed.
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    assert_eq!(events.len(), order_ids.len() * 2);
    for id in order_ids {
        let statuses: Vec<_> = events
            .iter()
            .filter(|e| e.order_id == id)
            .map(|e| e.new_status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                sig_schemas::OrderStatus::Executed,
                sig_schemas::OrderStatus::Closed
            ],
            "order {id} must see exactly executed then closed"
        );
        assert_eq!(
            st.store.get(id).unwrap().status,
            sig_schemas::OrderStatus::Closed
        );
    }
}
