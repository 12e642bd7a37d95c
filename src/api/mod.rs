//! Dashboard query surface, spec.md §6. Kept thin: plain async methods on
//! `AppState` plus a minimal axum router, reusing the teacher's generic
//! `middleware::logging`/`middleware::rate_limit` unchanged.

pub mod routes;

use crate::config::Config;
use crate::datastore::DataStore;
use crate::detectors::CooldownMap;
use crate::labels::LabelGenerator;
use crate::notifier::Notifier;
use crate::orderbook::OrderBookMonitor;
use crate::paper::PositionManager;
use crate::paper::account::VirtualAccount;
use crate::risk::RiskFilter;
use crate::tracker::Tracker;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tracker: Tracker,
    pub orderbook: OrderBookMonitor,
    pub cooldowns: CooldownMap,
    pub risk: RiskFilter,
    pub account: Arc<Mutex<VirtualAccount>>,
    pub positions: Arc<Mutex<PositionManager>>,
    pub labels: Arc<Mutex<LabelGenerator>>,
    pub store: Arc<DataStore>,
    pub notifier: Notifier,
}
