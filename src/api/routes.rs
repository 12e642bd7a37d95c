//! HTTP handlers for the dashboard query surface. `Query`/`State` extractors
//! and `Json` responses follow the teacher's `api/routes.rs` handler style.

use super::AppState;
use crate::middleware::{request_logging, RateLimitConfig, RateLimitLayer};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

pub fn router(state: AppState) -> Router {
    let rate_limiter = RateLimitLayer::new(RateLimitConfig::default());

    Router::new()
        .route("/health", get(health))
        .route("/api/account", get(account_snapshot))
        .route("/api/positions", get(open_positions))
        .route("/api/trades", get(trades))
        .route("/api/trades/stats", get(trade_statistics))
        .route("/api/equity-curve", get(equity_curve))
        .route("/api/features/stats", get(feature_statistics))
        .route("/api/labels/stats", get(label_statistics))
        .route("/api/alerts", get(alerts))
        .route("/api/status", get(system_status))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            crate::middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn account_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let positions = state.positions.lock();
    let unrealized = positions.total_unrealized_pnl();
    let open = positions.positions.len();
    drop(positions);
    let snapshot = state.account.lock().snapshot(open, unrealized, Utc::now());
    Json(snapshot)
}

async fn open_positions(State(state): State<AppState>) -> impl IntoResponse {
    let positions = state.positions.lock();
    let list: Vec<_> = positions.positions.values().cloned().collect();
    Json(list)
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<u32>,
}

async fn trades(State(state): State<AppState>, Query(params): Query<LimitParams>) -> impl IntoResponse {
    match state.store.recent_trades(params.limit.unwrap_or(100)) {
        Ok(trades) => Json(trades).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct TradeStatistics {
    total_trades: u64,
    win_trades: u64,
    win_rate: f64,
    total_pnl: f64,
    max_drawdown: f64,
}

async fn trade_statistics(State(state): State<AppState>) -> impl IntoResponse {
    let account = state.account.lock();
    Json(TradeStatistics {
        total_trades: account.total_trades,
        win_trades: account.win_trades,
        win_rate: account.win_rate(),
        total_pnl: account.total_pnl,
        max_drawdown: account.max_drawdown,
    })
}

async fn equity_curve(State(state): State<AppState>, Query(params): Query<LimitParams>) -> impl IntoResponse {
    match state.store.equity_curve(params.limit.unwrap_or(500)) {
        Ok(points) => Json(points).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct FeatureStatistics {
    total_features: u64,
    unlabeled_features: u64,
}

async fn feature_statistics(State(state): State<AppState>) -> impl IntoResponse {
    match (state.store.feature_count(), state.store.unlabeled_feature_count()) {
        (Ok(total), Ok(unlabeled)) => Json(FeatureStatistics {
            total_features: total,
            unlabeled_features: unlabeled,
        })
        .into_response(),
        (Err(err), _) | (_, Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct LabelStatistics {
    total_labels: u64,
    pending_in_memory: usize,
}

async fn label_statistics(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.labels.lock().pending_count();
    match state.store.label_count() {
        Ok(total) => Json(LabelStatistics {
            total_labels: total,
            pending_in_memory: pending,
        })
        .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn alerts(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.alert_count() {
        Ok(count) => Json(json!({ "total_alerts": count })).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "tracked_symbols": state.tracker.known_symbols().len(),
        "notifier_dropped": state.notifier.dropped_count(),
    }))
}
