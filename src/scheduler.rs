//! Periodic background tasks, spec.md §4.10: OI/spot polling, label
//! generation attempts, tracker cleanup, and account/equity persistence.
//! Each task is a `tokio::spawn`ed loop built on `tokio::time::interval`,
//! matching the interval-task style in the teacher's `main.rs` header; every
//! task is cancellation-safe (an interval tick awaited in a `select!` with
//! a shutdown signal never leaves partial state) per spec.md §5.

use crate::api::AppState;
use crate::exchange::RestClient;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Scheduler {
    state: AppState,
    rest: Arc<dyn RestClient>,
}

impl Scheduler {
    pub fn new(state: AppState, rest: Arc<dyn RestClient>) -> Self {
        Self { state, rest }
    }

    /// Spawns every periodic task, returning their join handles. `shutdown`
    /// fires once to stop all loops together.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(Self::oi_poll_loop(self.state.clone(), self.rest.clone(), shutdown.clone())),
            tokio::spawn(Self::spot_poll_loop(self.state.clone(), self.rest.clone(), shutdown.clone())),
            tokio::spawn(Self::label_loop(self.state.clone(), shutdown.clone())),
            tokio::spawn(Self::cleanup_loop(self.state.clone(), shutdown.clone())),
            tokio::spawn(Self::persist_loop(self.state.clone(), shutdown)),
        ]
    }

    async fn oi_poll_loop(state: AppState, rest: Arc<dyn RestClient>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(state.config.oi_poll_interval_sec));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for symbol in state.tracker.known_symbols() {
                        match rest.open_interest(&symbol).await {
                            Ok(obs) => state.tracker.update_oi(&symbol, obs.open_interest, obs.ts),
                            Err(err) => warn!(%symbol, error = %err, "open interest poll failed"),
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn spot_poll_loop(state: AppState, rest: Arc<dyn RestClient>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(state.config.spot_poll_interval_sec));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for symbol in state.tracker.known_symbols() {
                        match rest.spot_price(&symbol).await {
                            Ok(spot) => state.tracker.update_spot(&symbol, spot.price, spot.ts),
                            Err(err) => warn!(%symbol, error = %err, "spot price poll failed"),
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn label_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let labels = state.labels.lock().try_generate(&state.tracker, &state.config.ml.label, now);
                    for label in labels {
                        if let Err(err) = state.store.save_label(&label) {
                            error!(error = %err, "failed to persist label");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn cleanup_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(state.config.tracker_cleanup_interval_sec));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    state.tracker.cleanup_older_than(now, state.config.tracker_max_age_sec);
                    state.cooldowns.purge_stale(now, state.config.alerts.cooldown_sec);
                    info!("tracker cleanup tick complete");
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn persist_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(state.config.trading.realtime.save_interval_sec));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let positions = state.positions.lock();
                    let unrealized = positions.total_unrealized_pnl();
                    let open = positions.positions.len();
                    drop(positions);
                    let snapshot = state.account.lock().snapshot(open, unrealized, Utc::now());
                    if let Err(err) = state.store.save_account_state(&snapshot) {
                        error!(error = %err, "failed to persist account state");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
