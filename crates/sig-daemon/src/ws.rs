//! Real-time order stream (WebSocket).
//!
//! `GET /v1/orders/stream/{user_id}` upgrades to a WebSocket scoped to
//! one user id. The connection receives a `connection_established`
//! frame, then one JSON frame per lifecycle transition of that user's
//! orders, in publish order, until either side disconnects. There is no
//! replay; clients wanting the current state query `/v1/orders` first.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use sig_schemas::LifecycleEvent;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

pub(crate) async fn orders_stream(
    ws: WebSocketUpgrade,
    Path(user_id): Path<Uuid>,
    State(st): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(st, user_id, socket))
}

async fn handle_socket(st: Arc<AppState>, user_id: Uuid, socket: WebSocket) {
    let (handle, mut events) = st.broadcaster.subscribe(user_id);
    debug!(%user_id, "order stream connected");

    let (mut sink, mut inbound) = socket.split();

    let hello = json!({
        "type": "connection_established",
        "user_id": user_id,
    });
    if sink.send(Message::Text(hello.to_string())).await.is_err() {
        st.broadcaster.unsubscribe(&handle);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(frame) = event_frame(&event) else { continue };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            msg = inbound.next() => {
                match msg {
                    // Inbound frames are ignored: the stream is one-way.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    st.broadcaster.unsubscribe(&handle);
    debug!(%user_id, "order stream disconnected");
}

/// Serialize an event with a top-level `type` discriminator, e.g.
/// `order.executed`.
fn event_frame(event: &LifecycleEvent) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(event)?;
    value["type"] = json!(event.kind());
    serde_json::to_string(&value)
}
