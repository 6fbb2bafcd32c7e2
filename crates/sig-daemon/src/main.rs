//! sig-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the
//! shared state from environment variables, wires middleware, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use sig_audit::ActivityLog;
use sig_daemon::{routes, state};
use sig_lifecycle::LifecycleDelays;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let audit = match std::env::var("SIG_ACTIVITY_LOG") {
        Ok(path) => Some(ActivityLog::new(&path).context("open activity log")?),
        Err(_) => None,
    };

    let shared = Arc::new(state::AppState::new(delays_from_env(), audit));
    shared.log_activity(None, "daemon_started", serde_json::json!({}));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8930)));
    info!("sig-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("SIG_DAEMON_ADDR").ok()?.parse().ok()
}

/// Lifecycle delays, env-overridable for demos and local testing.
fn delays_from_env() -> LifecycleDelays {
    let defaults = LifecycleDelays::default();
    LifecycleDelays {
        execute_after: secs_from_env("SIG_EXECUTE_DELAY_SECS").unwrap_or(defaults.execute_after),
        close_after: secs_from_env("SIG_CLOSE_DELAY_SECS").unwrap_or(defaults.close_after),
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    std::env::var(key).ok()?.parse::<u64>().ok().map(Duration::from_secs)
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
