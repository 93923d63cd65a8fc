//! Webhook ingress and HTTP surface
//!
//! Accepts enhanced-transaction batches, validates each element, and hands
//! valid payloads to detached pipeline tasks so the provider gets its 200
//! within milliseconds. Also serves health, price stats, notification test,
//! and the webhook-provisioning admin endpoints.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use crate::alerts::AlertEngine;
use crate::config::{ServerConfig, ThresholdConfig};
use crate::helius::HeliusClient;
use crate::notifier::Notifier;
use crate::price::PriceOracle;
use crate::registry::Registry;
use crate::types::EnhancedTransaction;
use crate::window_store::WindowStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub store: WindowStore,
    pub oracle: Arc<PriceOracle>,
    pub registry: Registry,
    pub notifier: Arc<Notifier>,
    pub helius: Arc<HeliusClient>,
    pub thresholds: ThresholdConfig,
    pub target_mint: String,
    /// Pipeline tasks currently running, for the shutdown drain
    pub in_flight: Arc<AtomicUsize>,
}

/// Split a webhook body (single object or array) into deserialized payloads
/// and a skipped count. An element is well-formed iff `signature` and
/// `timestamp` are present.
pub fn partition_batch(body: &Value) -> (Vec<EnhancedTransaction>, usize, usize) {
    let elements: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let total = elements.len();

    let mut valid = Vec::new();
    let mut skipped = 0;
    for element in elements {
        let well_formed = element.get("signature").and_then(Value::as_str).is_some()
            && element.get("timestamp").and_then(Value::as_u64).is_some();
        if !well_formed {
            warn!("⚠️  Skipping webhook element without signature/timestamp");
            skipped += 1;
            continue;
        }

        match serde_json::from_value::<EnhancedTransaction>(element.clone()) {
            Ok(tx) => valid.push(tx),
            Err(e) => {
                warn!("⚠️  Skipping undecodable webhook element: {}", e);
                skipped += 1;
            }
        }
    }

    (valid, skipped, total)
}

/// Decrements the in-flight counter when the pipeline task ends, panics
/// included.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            error!("❌ Unparsable webhook body: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "invalid JSON body"})),
            )
                .into_response();
        }
    };

    let (valid, skipped, total) = partition_batch(&parsed);
    let processed = valid.len();

    for tx in valid {
        let engine = state.engine.clone();
        let guard = InFlightGuard::new(state.in_flight.clone());
        tokio::spawn(async move {
            let _guard = guard;
            engine.handle_payload(&tx).await;
        });
    }

    Json(json!({
        "processed": processed,
        "skipped": skipped,
        "total": total,
    }))
    .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let store_ok = state.store.ping().await.is_ok();

    let wallet_count = state.registry.wallet_count().unwrap_or(0);
    let (general, sequential, chat) = state.registry.subscriber_counts().unwrap_or((0, 0, 0));

    let body = json!({
        "status": if store_ok { "healthy" } else { "degraded" },
        "window_store": store_ok,
        "thresholds": {
            "chat_threshold_usd": state.thresholds.chat_threshold_usd,
            "single_threshold_usd": state.thresholds.single_threshold_usd,
            "cumulative_threshold_usd": state.thresholds.cumulative_threshold_usd,
            "window_seconds": state.thresholds.window_seconds,
            "five_sells_threshold_usd": state.thresholds.five_sells_threshold_usd,
            "five_sells_enabled": state.thresholds.five_sells_enabled,
        },
        "tracked_wallets": wallet_count,
        "subscribers": {
            "general": general,
            "sequential_sells": sequential,
            "chat": chat,
        },
    });

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn price_stats_handler(State(state): State<AppState>) -> Response {
    match state.oracle.token_price(&state.target_mint).await {
        Some(price) => Json(json!({
            "mint": state.target_mint,
            "price_usd": price,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "price unavailable"})),
        )
            .into_response(),
    }
}

async fn test_notifications_handler(State(state): State<AppState>) -> Response {
    let (chat_ok, push_ok) = state.notifier.send_test().await;
    Json(json!({"chat": chat_ok, "push": push_ok})).into_response()
}

// ----------------------------------------------------------------------
// Admin: webhook provisioning on the upstream provider
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddressesBody {
    addresses: Vec<String>,
}

fn admin_error(e: anyhow::Error) -> Response {
    error!("❌ Provider admin call failed: {:#}", e);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": format!("{:#}", e)})),
    )
        .into_response()
}

async fn admin_list_webhooks(State(state): State<AppState>) -> Response {
    match state.helius.list_webhooks().await {
        Ok(webhooks) => Json(webhooks).into_response(),
        Err(e) => admin_error(e),
    }
}

async fn admin_create_webhook(
    State(state): State<AppState>,
    Json(body): Json<AddressesBody>,
) -> Response {
    match state.helius.create_or_update(body.addresses).await {
        Ok(webhook) => Json(webhook).into_response(),
        Err(e) => admin_error(e),
    }
}

async fn admin_get_webhook(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.helius.get_webhook(&id).await {
        Ok(webhook) => Json(webhook).into_response(),
        Err(e) => admin_error(e),
    }
}

async fn admin_delete_webhook(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.helius.delete_webhook(&id).await {
        Ok(()) => Json(json!({"deleted": id})).into_response(),
        Err(e) => admin_error(e),
    }
}

async fn admin_add_addresses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddressesBody>,
) -> Response {
    match state.helius.add_addresses(&id, &body.addresses).await {
        Ok(webhook) => Json(webhook).into_response(),
        Err(e) => admin_error(e),
    }
}

async fn admin_remove_addresses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddressesBody>,
) -> Response {
    match state.helius.remove_addresses(&id, &body.addresses).await {
        Ok(webhook) => Json(webhook).into_response(),
        Err(e) => admin_error(e),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/stats/price", get(price_stats_handler))
        .route("/test/notifications", post(test_notifications_handler))
        .route(
            "/admin/webhooks",
            get(admin_list_webhooks).post(admin_create_webhook),
        )
        .route(
            "/admin/webhooks/:id",
            get(admin_get_webhook).delete(admin_delete_webhook),
        )
        .route(
            "/admin/webhooks/:id/addresses",
            post(admin_add_addresses).delete(admin_remove_addresses),
        )
        .with_state(state)
}

/// Serve until ctrl-c, then drain in-flight pipeline tasks within the
/// configured window.
pub async fn run(state: AppState, server_config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", server_config.bind_address, server_config.port);
    let drain_secs = server_config.shutdown_drain_secs;
    let in_flight = state.in_flight.clone();

    let app = router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind ingress listener")?;
    info!("✅ Ingress: Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Ingress server error")?;

    drain(in_flight, drain_secs).await;
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM (what the orchestrator sends on rollout).
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        Err(e) => {
            warn!("⚠️  SIGTERM handler unavailable ({}), watching ctrl-c only", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    info!("🛑 Shutdown signal received, draining pipeline tasks...");
}

async fn drain(in_flight: Arc<AtomicUsize>, drain_secs: u64) {
    let deadline = Instant::now() + Duration::from_secs(drain_secs);
    loop {
        let remaining = in_flight.load(Ordering::SeqCst);
        if remaining == 0 {
            info!("✅ All pipeline tasks drained");
            return;
        }
        if Instant::now() >= deadline {
            warn!(
                "⚠️  Drain window elapsed, dropping {} in-flight task(s)",
                remaining
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
