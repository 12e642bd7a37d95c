//! Delay-gated label generation. Spec.md §4.6: a feature recorded at `t`
//! can only be labeled once enough future price history exists to compute
//! forward returns, and the invariant `labelGeneratedAt > featureTs + 1800s`
//! must never be violated — violating it would leak the future into a
//! training row. The bounded per-symbol queue mirrors the teacher's
//! `risk.rs::VaRCalculator` bounded `VecDeque` history pattern.

use crate::config::LabelConfig;
use crate::models::{Direction, FeatureVector, Label, Ts};
use crate::tracker::Tracker;
use std::collections::VecDeque;
use tracing::error;

/// Label horizons, in seconds, spec.md §4.6.
const HORIZON_1M: i64 = 60;
const HORIZON_5M: i64 = 300;
const HORIZON_15M: i64 = 900;
const HORIZON_30M: i64 = 1800;

/// The no-lookahead gate: a label can only be generated once `30m` of
/// forward price history is available.
const MIN_DELAY_SEC: i64 = HORIZON_30M;

#[derive(Debug, Default)]
pub struct LabelGenerator {
    pending: VecDeque<(String, FeatureVector)>,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, feature: FeatureVector) {
        self.pending.push_back((feature.symbol.clone(), feature));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pops every pending feature old enough to label, computes forward
    /// returns from `tracker`, and returns the generated labels. Features
    /// that can't yet be labeled (not enough forward history) stay queued.
    pub fn try_generate(&mut self, tracker: &Tracker, config: &LabelConfig, now: Ts) -> Vec<Label> {
        let mut still_pending = VecDeque::new();
        let mut labels = Vec::new();

        while let Some((symbol, feature)) = self.pending.pop_front() {
            let age = (now - feature.ts).num_seconds();
            if age <= MIN_DELAY_SEC {
                still_pending.push_back((symbol, feature));
                continue;
            }
            match Self::compute_label(tracker, &feature, config, now) {
                Some(label) => {
                    if label.label_generated_at <= label.feature_ts + chrono::Duration::seconds(HORIZON_30M) {
                        error!(
                            symbol = %label.symbol,
                            feature_ts = %label.feature_ts,
                            label_generated_at = %label.label_generated_at,
                            "label generated before the no-lookahead delay elapsed, dropping"
                        );
                        continue;
                    }
                    labels.push(label);
                }
                None => {
                    // Tracker no longer has history for this symbol (cleaned up); drop silently.
                }
            }
        }

        self.pending = still_pending;
        labels
    }

    fn compute_label(
        tracker: &Tracker,
        feature: &FeatureVector,
        config: &LabelConfig,
        now: Ts,
    ) -> Option<Label> {
        let base = feature.price;
        let window = tracker.prices_in_window(
            &feature.symbol,
            now,
            (now - feature.ts).num_seconds(),
        );
        let price_at = |horizon_sec: i64| -> Option<f64> {
            let target = feature.ts + chrono::Duration::seconds(horizon_sec);
            window
                .iter()
                .filter(|p| p.ts >= target)
                .min_by_key(|p| (p.ts - target).num_milliseconds().abs())
                .map(|p| p.price)
        };

        let ret = |horizon_sec: i64| -> Option<f64> {
            price_at(horizon_sec).map(|p| (p - base) / base * 100.0)
        };

        let return_1m = ret(HORIZON_1M)?;
        let return_5m = ret(HORIZON_5M)?;
        let return_15m = ret(HORIZON_15M)?;
        let return_30m = ret(HORIZON_30M)?;

        let path_5m: Vec<f64> = window
            .iter()
            .filter(|p| p.ts <= feature.ts + chrono::Duration::seconds(HORIZON_5M))
            .map(|p| p.price)
            .collect();
        let max_profit_5m = path_5m
            .iter()
            .map(|p| (p - base) / base * 100.0)
            .fold(f64::MIN, f64::max);
        let max_drawdown_5m = path_5m
            .iter()
            .map(|p| (p - base) / base * 100.0)
            .fold(f64::MAX, f64::min);

        Some(Label {
            symbol: feature.symbol.clone(),
            feature_ts: feature.ts,
            return_1m,
            return_5m,
            return_15m,
            return_30m,
            direction_5m: Direction::from_return(return_5m, config.direction_threshold_pct),
            direction_15m: Direction::from_return(return_15m, config.direction_threshold_pct),
            max_profit_5m: if max_profit_5m.is_finite() { max_profit_5m } else { 0.0 },
            max_drawdown_5m: if max_drawdown_5m.is_finite() { max_drawdown_5m } else { 0.0 },
            label_generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> Ts {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn feature_at(symbol: &str, price: f64, ts: Ts) -> FeatureVector {
        FeatureVector {
            symbol: symbol.to_string(),
            ts,
            price,
            price_change_60s: None,
            price_change_300s: None,
            price_change_900s: None,
            volatility_60s: None,
            volatility_300s: None,
            volume_ratio_6: None,
            volume_ratio_30: None,
            oi_delta_5m: None,
            oi_delta_15m: None,
            spread_pct: None,
            imbalance_5: None,
            imbalance_10: None,
            imbalance_20: None,
            nearest_bid_wall_distance_pct: None,
            nearest_bid_wall_value: None,
            nearest_ask_wall_distance_pct: None,
            nearest_ask_wall_value: None,
            sma_5: None,
            sma_20: None,
            sma_60: None,
            ema_12: None,
            ema_26: None,
            rsi_14: None,
            macd_line: None,
            macd_signal: None,
            macd_hist: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            reversal_type: None,
            reversal_rise_pct: None,
            reversal_fall_pct: None,
            tier: None,
            alert_triggered: false,
            alert_kinds: Vec::new(),
        }
    }

    #[test]
    fn label_not_generated_before_delay() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 1.0, t0);
        let mut generator = LabelGenerator::new();
        generator.register(feature_at("BTCUSDT", 100.0, t0));
        let labels = generator.try_generate(&tracker, &LabelConfig::default(), t0 + Duration::seconds(600));
        assert!(labels.is_empty());
        assert_eq!(generator.pending_count(), 1);
    }

    #[test]
    fn label_generated_after_delay_with_full_history() {
        let tracker = Tracker::new();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 1.0, t0);
        for sec in [60, 300, 900, 1800] {
            tracker.update("BTCUSDT", 110.0, 1.0, t0 + Duration::seconds(sec));
        }
        let mut generator = LabelGenerator::new();
        generator.register(feature_at("BTCUSDT", 100.0, t0));
        let labels = generator.try_generate(
            &tracker,
            &LabelConfig::default(),
            t0 + Duration::seconds(1801),
        );
        assert_eq!(labels.len(), 1);
        assert!(labels[0].label_generated_at > labels[0].feature_ts + Duration::seconds(1800));
    }
}
