//! Per-symbol sliding-window state: price/volume history, OI history, spot
//! price, and the book/wall snapshots needed by the detectors. Spec.md §4.1.
//! Ring sizing follows spec.md §9 ("sliding windows sized for the longest
//! detector window with headroom, not unbounded growth").

use crate::error::TrackerError;
use crate::models::{OiObservation, PriceReversal, PricePoint, ReversalType, SpotPrice, Ts};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const PRICE_RING_CAP: usize = 1000;
const OI_RING_CAP: usize = 100;
const SPOT_RING_CAP: usize = 100;

#[derive(Debug, Default)]
struct SymbolState {
    prices: VecDeque<PricePoint>,
    oi: VecDeque<OiObservation>,
    spot: VecDeque<SpotPrice>,
    last_oi_value: f64,
}

impl SymbolState {
    fn push_price(&mut self, point: PricePoint) {
        if self.prices.len() == PRICE_RING_CAP {
            self.prices.pop_front();
        }
        self.prices.push_back(point);
    }

    fn push_oi(&mut self, obs: OiObservation) {
        if self.oi.len() == OI_RING_CAP {
            self.oi.pop_front();
        }
        self.oi.push_back(obs);
    }

    fn push_spot(&mut self, spot: SpotPrice) {
        if self.spot.len() == SPOT_RING_CAP {
            self.spot.pop_front();
        }
        self.spot.push_back(spot);
    }

    fn since(&self, now: Ts, window_sec: i64) -> impl Iterator<Item = &PricePoint> {
        self.prices
            .iter()
            .filter(move |p| (now - p.ts).num_seconds() <= window_sec)
    }
}

/// Holds a `SymbolState` per symbol behind a lock so each symbol can be
/// updated independently (single writer per symbol in practice, since the
/// feed task is keyed by symbol); reads take the same lock.
#[derive(Debug, Default, Clone)]
pub struct Tracker {
    symbols: Arc<RwLock<HashMap<String, Arc<RwLock<SymbolState>>>>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, symbol: &str) -> Arc<RwLock<SymbolState>> {
        if let Some(state) = self.symbols.read().get(symbol) {
            return state.clone();
        }
        self.symbols
            .write()
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(SymbolState::default())))
            .clone()
    }

    pub fn update(&self, symbol: &str, price: f64, volume: f64, ts: Ts) {
        self.entry(symbol)
            .write()
            .push_price(PricePoint { price, volume, ts });
    }

    pub fn update_oi(&self, symbol: &str, open_interest: f64, ts: Ts) {
        let state = self.entry(symbol);
        let mut guard = state.write();
        guard.last_oi_value = open_interest;
        guard.push_oi(OiObservation { open_interest, ts });
    }

    pub fn update_spot(&self, symbol: &str, price: f64, ts: Ts) {
        self.entry(symbol).write().push_spot(SpotPrice { price, ts });
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbols.read().contains_key(symbol)
    }

    pub fn known_symbols(&self) -> Vec<String> {
        self.symbols.read().keys().cloned().collect()
    }

    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.entry(symbol).read().prices.back().map(|p| p.price)
    }

    pub fn price_point_count(&self, symbol: &str) -> usize {
        self.entry(symbol).read().prices.len()
    }

    /// Percent change of current price against the oldest price point within
    /// `window_sec`. `None` if the window has no earlier point to compare.
    pub fn price_change(
        &self,
        symbol: &str,
        now: Ts,
        window_sec: i64,
    ) -> Result<Option<f64>, TrackerError> {
        let state = self.entry(symbol);
        let guard = state.read();
        let current = guard
            .prices
            .back()
            .ok_or_else(|| TrackerError::UnknownSymbol(symbol.to_string()))?
            .price;
        let earliest = guard.since(now, window_sec).next();
        Ok(earliest.map(|p| (current - p.price) / p.price * 100.0))
    }

    /// Ratio of the most recent bucket's volume sum to the average of the
    /// preceding `lookback` buckets. Uses whatever price points fall in the
    /// trailing window as one "bucket" — the caller (detector) owns bucketing
    /// semantics; here we expose the raw sums it needs.
    pub fn volume_ratio(&self, symbol: &str, now: Ts, recent_sec: i64, lookback_sec: i64) -> Option<f64> {
        let state = self.entry(symbol);
        let guard = state.read();
        let recent: f64 = guard
            .prices
            .iter()
            .filter(|p| (now - p.ts).num_seconds() <= recent_sec)
            .map(|p| p.volume)
            .sum();
        let baseline_points: Vec<&PricePoint> = guard
            .prices
            .iter()
            .filter(|p| {
                let age = (now - p.ts).num_seconds();
                age > recent_sec && age <= lookback_sec
            })
            .collect();
        if baseline_points.is_empty() {
            return None;
        }
        let baseline_avg =
            baseline_points.iter().map(|p| p.volume).sum::<f64>() / baseline_points.len() as f64;
        if baseline_avg <= 0.0 {
            return None;
        }
        Some(recent / baseline_avg)
    }

    pub fn oi_change(&self, symbol: &str, now: Ts, window_sec: i64) -> Option<f64> {
        let state = self.entry(symbol);
        let guard = state.read();
        let current = guard.oi.back()?.open_interest;
        let earliest = guard
            .oi
            .iter()
            .find(|o| (now - o.ts).num_seconds() <= window_sec)?;
        if earliest.open_interest <= 0.0 {
            return None;
        }
        Some((current - earliest.open_interest) / earliest.open_interest * 100.0)
    }

    /// `(futures - spot) / spot * 100`, positive means futures trade at a
    /// premium.
    pub fn spot_futures_spread(&self, symbol: &str) -> Option<f64> {
        let state = self.entry(symbol);
        let guard = state.read();
        let futures = guard.prices.back()?.price;
        let spot = guard.spot.back()?.price;
        if spot <= 0.0 {
            return None;
        }
        Some((futures - spot) / spot * 100.0)
    }

    /// Current open-interest value in quote terms: `currentPrice * openInterest`.
    /// This is the basis spec.md fixes for tier classification.
    pub fn oi_value(&self, symbol: &str) -> Option<f64> {
        let state = self.entry(symbol);
        let guard = state.read();
        let price = guard.prices.back()?.price;
        if guard.last_oi_value <= 0.0 {
            return None;
        }
        Some(price * guard.last_oi_value)
    }

    /// Scans the trailing `window_sec` for a local extreme followed by a
    /// reversal back toward the start price. Spec.md §4.1/§4.2 PriceReversal.
    pub fn price_reversal(&self, symbol: &str, now: Ts, window_sec: i64) -> Option<PriceReversal> {
        let state = self.entry(symbol);
        let guard = state.read();
        let window: Vec<&PricePoint> = guard.since(now, window_sec).collect();
        if window.len() < 3 {
            return None;
        }
        let start = window.first()?;
        let current = window.last()?;

        let high_point = window
            .iter()
            .max_by(|a, b| a.price.partial_cmp(&b.price).unwrap())?;
        let low_point = window
            .iter()
            .min_by(|a, b| a.price.partial_cmp(&b.price).unwrap())?;

        let rise_from_start_to_high = (high_point.price - start.price) / start.price * 100.0;
        let fall_from_high_to_current = (current.price - high_point.price) / high_point.price * 100.0;
        let fall_from_start_to_low = (low_point.price - start.price) / start.price * 100.0;
        let rise_from_low_to_current = (current.price - low_point.price) / low_point.price * 100.0;

        // Top reversal: ran up then gave it back, and the high came before the current point.
        if high_point.ts < current.ts && rise_from_start_to_high > 0.0 && fall_from_high_to_current < 0.0 {
            return Some(PriceReversal {
                reversal_type: ReversalType::Top,
                start_price: start.price,
                high: high_point.price,
                low: low_point.price,
                current: current.price,
                rise_pct: rise_from_start_to_high,
                fall_pct: fall_from_high_to_current,
                extreme_ts: high_point.ts,
            });
        }
        // Bottom reversal: dropped then bounced back.
        if low_point.ts < current.ts && fall_from_start_to_low < 0.0 && rise_from_low_to_current > 0.0 {
            return Some(PriceReversal {
                reversal_type: ReversalType::Bottom,
                start_price: start.price,
                high: high_point.price,
                low: low_point.price,
                current: current.price,
                rise_pct: rise_from_low_to_current,
                fall_pct: fall_from_start_to_low,
                extreme_ts: low_point.ts,
            });
        }
        None
    }

    pub fn prices_in_window(&self, symbol: &str, now: Ts, window_sec: i64) -> Vec<PricePoint> {
        let state = self.entry(symbol);
        let guard = state.read();
        guard.since(now, window_sec).copied().collect()
    }

    /// Drop price/OI/spot points older than `max_age_sec`, and drop the
    /// symbol entirely once its price ring is empty. Invoked from the
    /// Scheduler's periodic cleanup tick (spec.md §4.10).
    pub fn cleanup_older_than(&self, now: Ts, max_age_sec: i64) {
        let symbols: Vec<String> = self.symbols.read().keys().cloned().collect();
        for symbol in symbols {
            let state = self.entry(&symbol);
            let mut guard = state.write();
            guard
                .prices
                .retain(|p| (now - p.ts).num_seconds() <= max_age_sec);
            guard.oi.retain(|o| (now - o.ts).num_seconds() <= max_age_sec);
            guard
                .spot
                .retain(|s| (now - s.ts).num_seconds() <= max_age_sec);
            let empty = guard.prices.is_empty();
            drop(guard);
            if empty {
                self.symbols.write().remove(&symbol);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> Ts {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn price_change_uses_oldest_point_in_window() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 10.0, t0);
        tracker.update("BTCUSDT", 103.0, 10.0, t0 + Duration::seconds(30));
        let change = tracker
            .price_change("BTCUSDT", t0 + Duration::seconds(30), 60)
            .unwrap();
        assert_eq!(change, Some(3.0));
    }

    #[test]
    fn oi_value_is_price_times_open_interest() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 50_000.0, 1.0, t0);
        tracker.update_oi("BTCUSDT", 2_000.0, t0);
        assert_eq!(tracker.oi_value("BTCUSDT"), Some(100_000_000.0));
    }

    #[test]
    fn cleanup_drops_stale_symbol() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 1.0, t0);
        tracker.cleanup_older_than(t0 + Duration::seconds(7200), 3600);
        assert!(!tracker.has_symbol("BTCUSDT"));
    }

    #[test]
    fn top_reversal_detected() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 1.0, t0);
        tracker.update("BTCUSDT", 110.0, 1.0, t0 + Duration::seconds(60));
        tracker.update("BTCUSDT", 104.0, 1.0, t0 + Duration::seconds(120));
        let reversal = tracker
            .price_reversal("BTCUSDT", t0 + Duration::seconds(120), 300)
            .unwrap();
        assert!(matches!(reversal.reversal_type, ReversalType::Top));
    }
}
