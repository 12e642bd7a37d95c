//! Assembles a `FeatureVector` from a `Tracker` snapshot, `IndicatorCalc`
//! output, and an `OrderBookMonitor` snapshot. Spec.md §4.5: deterministic,
//! read-only (never writes back into the Tracker), returns `None` if there
//! are fewer than 5 price points yet.

use crate::config::MlConfig;
use crate::indicators;
use crate::models::{AnomalyEvent, BookSide, DepthSnapshot, FeatureVector, Ts};
use crate::orderbook::OrderBookMonitor;
use crate::tracker::Tracker;

const MIN_PRICE_POINTS: usize = 5;

pub struct FeatureEngine;

impl FeatureEngine {
    /// `depth` and `recent_events` are optional: a symbol without book data
    /// still gets a FeatureVector, just with the book-derived fields left
    /// `None`.
    pub fn build(
        tracker: &Tracker,
        orderbook: &OrderBookMonitor,
        config: &MlConfig,
        symbol: &str,
        tier: Option<&str>,
        depth: Option<&DepthSnapshot>,
        recent_events: &[AnomalyEvent],
        now: Ts,
    ) -> Option<FeatureVector> {
        if tracker.price_point_count(symbol) < MIN_PRICE_POINTS {
            return None;
        }
        let price = tracker.latest_price(symbol)?;

        let price_change_60s = tracker.price_change(symbol, now, 60).ok().flatten();
        let price_change_300s = tracker.price_change(symbol, now, 300).ok().flatten();
        let price_change_900s = tracker.price_change(symbol, now, 900).ok().flatten();

        let closes: Vec<f64> = tracker
            .prices_in_window(symbol, now, 3600)
            .into_iter()
            .map(|p| p.price)
            .collect();

        let volatility_60s = {
            let window: Vec<f64> = tracker
                .prices_in_window(symbol, now, 60)
                .into_iter()
                .map(|p| p.price)
                .collect();
            indicators::volatility(&window)
        };
        let volatility_300s = {
            let window: Vec<f64> = tracker
                .prices_in_window(symbol, now, 300)
                .into_iter()
                .map(|p| p.price)
                .collect();
            indicators::volatility(&window)
        };

        let volume_ratio_6 = tracker.volume_ratio(symbol, now, 60, 360);
        let volume_ratio_30 = tracker.volume_ratio(symbol, now, 60, 1800);
        let oi_delta_5m = tracker.oi_change(symbol, now, 300);
        let oi_delta_15m = tracker.oi_change(symbol, now, 900);
        let spread_pct = tracker.spot_futures_spread(symbol);

        let (imbalance_5, imbalance_10, imbalance_20) = match depth {
            Some(d) => (
                d.imbalance_ratio(5),
                d.imbalance_ratio(10),
                d.imbalance_ratio(20),
            ),
            None => (None, None, None),
        };

        let (bid_wall_dist, bid_wall_value) = match (depth, orderbook.tracked_wall(symbol, BookSide::Bid)) {
            (Some(d), Some(wall)) => {
                let mid = d.mid_price().unwrap_or(price);
                (Some((mid - wall.price) / mid * 100.0), Some(wall.value))
            }
            _ => (None, None),
        };
        let (ask_wall_dist, ask_wall_value) = match (depth, orderbook.tracked_wall(symbol, BookSide::Ask)) {
            (Some(d), Some(wall)) => {
                let mid = d.mid_price().unwrap_or(price);
                (Some((wall.price - mid) / mid * 100.0), Some(wall.value))
            }
            _ => (None, None),
        };

        let sma_periods = &config.indicators.ma_periods;
        let sma_5 = sma_periods
            .first()
            .and_then(|p| indicators::sma(&closes, *p));
        let sma_20 = sma_periods
            .get(1)
            .and_then(|p| indicators::sma(&closes, *p));
        let sma_60 = sma_periods
            .get(2)
            .and_then(|p| indicators::sma(&closes, *p));
        let ema_12 = indicators::ema(&closes, config.indicators.macd_fast);
        let ema_26 = indicators::ema(&closes, config.indicators.macd_slow);
        let rsi_14 = indicators::rsi(&closes, config.indicators.rsi_period);
        let macd = indicators::macd(
            &closes,
            config.indicators.macd_fast,
            config.indicators.macd_slow,
            config.indicators.macd_signal,
        );
        let bollinger = indicators::bollinger(&closes, config.indicators.bb_period, config.indicators.bb_std);

        let reversal = tracker.price_reversal(symbol, now, 300);

        let matching_events: Vec<&AnomalyEvent> = recent_events
            .iter()
            .filter(|e| e.symbol == symbol)
            .collect();

        Some(FeatureVector {
            symbol: symbol.to_string(),
            ts: now,
            price,
            price_change_60s,
            price_change_300s,
            price_change_900s,
            volatility_60s,
            volatility_300s,
            volume_ratio_6,
            volume_ratio_30,
            oi_delta_5m,
            oi_delta_15m,
            spread_pct,
            imbalance_5,
            imbalance_10,
            imbalance_20,
            nearest_bid_wall_distance_pct: bid_wall_dist,
            nearest_bid_wall_value: bid_wall_value,
            nearest_ask_wall_distance_pct: ask_wall_dist,
            nearest_ask_wall_value: ask_wall_value,
            sma_5,
            sma_20,
            sma_60,
            ema_12,
            ema_26,
            rsi_14,
            macd_line: macd.as_ref().map(|m| m.line),
            macd_signal: macd.as_ref().map(|m| m.signal),
            macd_hist: macd.as_ref().map(|m| m.histogram),
            bb_upper: bollinger.as_ref().map(|b| b.upper),
            bb_middle: bollinger.as_ref().map(|b| b.middle),
            bb_lower: bollinger.as_ref().map(|b| b.lower),
            reversal_type: reversal.as_ref().map(|r| format!("{:?}", r.reversal_type)),
            reversal_rise_pct: reversal.as_ref().map(|r| r.rise_pct),
            reversal_fall_pct: reversal.as_ref().map(|r| r.fall_pct),
            tier: tier.map(|t| t.to_string()),
            alert_triggered: !matching_events.is_empty(),
            alert_kinds: matching_events
                .iter()
                .map(|e| e.kind.as_str().to_string())
                .collect(),
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

    #[test]
    fn returns_none_below_minimum_price_points() {
        let tracker = Tracker::new();
        let orderbook = OrderBookMonitor::new();
        let config = MlConfig::default();
        let t0 = t0();
        tracker.update("BTCUSDT", 100.0, 1.0, t0);
        tracker.update("BTCUSDT", 101.0, 1.0, t0 + Duration::seconds(1));
        let fv = FeatureEngine::build(
            &tracker, &orderbook, &config, "BTCUSDT", None, None, &[], t0,
        );
        assert!(fv.is_none());
    }

    #[test]
    fn builds_vector_once_enough_history() {
        let tracker = Tracker::new();
        let orderbook = OrderBookMonitor::new();
        let config = MlConfig::default();
        let t0 = t0();
        for i in 0..10 {
            tracker.update(
                "BTCUSDT",
                100.0 + i as f64,
                1.0,
                t0 + Duration::seconds(i),
            );
        }
        let fv = FeatureEngine::build(
            &tracker,
            &orderbook,
            &config,
            "BTCUSDT",
            Some("small"),
            None,
            &[],
            t0 + Duration::seconds(9),
        )
        .unwrap();
        assert_eq!(fv.symbol, "BTCUSDT");
        assert!(fv.price_change_60s.is_some());
    }
}
