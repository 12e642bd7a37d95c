//! Order-book anomaly detection: walls, imbalance, sweeps. Spec.md §4.3.
//! Tracked-wall diffing keeps a `HashMap<(symbol, side), WallState>` the way
//! the teacher's `vault/paper_ledger.rs` diffs a `HashMap<String, Position>`
//! between ledger snapshots — new/changed/vanished entries all matter.

use crate::config::OrderBookConfig;
use crate::models::{AnomalyEvent, AnomalyKind, BookSide, DepthSnapshot, TierConfig, Ts, WallState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

fn event(
    symbol: &str,
    kind: AnomalyKind,
    tier: &str,
    current_price: f64,
    change_pct: f64,
    threshold: f64,
    ts: Ts,
    extras: HashMap<String, f64>,
) -> AnomalyEvent {
    AnomalyEvent {
        symbol: symbol.to_string(),
        kind,
        tier: tier.to_string(),
        current_price,
        change_pct,
        threshold,
        window_sec: 0,
        ts,
        extras,
    }
}

/// Holds the last seen wall per `(symbol, side)` so walls can be tracked
/// across snapshots (first seen / still present / vanished).
#[derive(Debug, Clone, Default)]
pub struct OrderBookMonitor {
    walls: Arc<Mutex<HashMap<(String, BookSide), WallState>>>,
}

impl OrderBookMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn largest_wall(
        depth: &DepthSnapshot,
        side: BookSide,
        config: &OrderBookConfig,
        mid: f64,
    ) -> Option<(f64, f64, f64)> {
        let levels: &[(f64, f64)] = match side {
            BookSide::Bid => &depth.bids,
            BookSide::Ask => &depth.asks,
        };
        let levels = levels.iter().take(config.depth_levels.max(1));
        let avg_value: f64 = {
            let values: Vec<f64> = levels.clone().map(|(p, q)| p * q).collect();
            if values.is_empty() {
                return None;
            }
            values.iter().sum::<f64>() / values.len() as f64
        };
        if avg_value <= 0.0 {
            return None;
        }
        levels
            .map(|(p, q)| (*p, *q, p * q))
            .filter(|(price, _, value)| {
                let distance_pct = ((price - mid) / mid * 100.0).abs();
                *value >= config.wall_value_threshold
                    && *value / avg_value >= config.wall_ratio_threshold
                    && distance_pct <= config.wall_distance_max_pct
            })
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
    }

    pub fn detect_walls(
        &self,
        depth: &DepthSnapshot,
        tier: &TierConfig,
        config: &OrderBookConfig,
    ) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();
        let Some(mid) = depth.mid_price() else {
            return events;
        };

        for side in [BookSide::Bid, BookSide::Ask] {
            let key = (depth.symbol.clone(), side);
            match Self::largest_wall(depth, side, config, mid) {
                Some((price, qty, value)) => {
                    let mut walls = self.walls.lock();
                    let is_new = !walls.contains_key(&key);
                    let entry = walls.entry(key.clone()).or_insert_with(|| WallState {
                        symbol: depth.symbol.clone(),
                        side,
                        price,
                        qty,
                        value,
                        first_seen: depth.ts,
                        last_seen: depth.ts,
                    });
                    entry.price = price;
                    entry.qty = qty;
                    entry.value = value;
                    entry.last_seen = depth.ts;
                    drop(walls);

                    if is_new {
                        let mut extras = HashMap::new();
                        extras.insert("wall_price".to_string(), price);
                        extras.insert("wall_value".to_string(), value);
                        events.push(event(
                            &depth.symbol,
                            AnomalyKind::OrderBookWall,
                            &tier.label,
                            mid,
                            value,
                            config.wall_value_threshold,
                            depth.ts,
                            extras,
                        ));
                    }
                }
                None => {
                    self.walls.lock().remove(&key);
                }
            }
        }
        events
    }

    pub fn detect_imbalance(
        &self,
        depth: &DepthSnapshot,
        tier: &TierConfig,
        config: &OrderBookConfig,
    ) -> Option<AnomalyEvent> {
        let mid = depth.mid_price()?;
        let ratio = depth.imbalance_ratio(config.imbalance_depth_levels)?;
        if ratio.abs() < config.imbalance_threshold {
            return None;
        }
        let mut extras = HashMap::new();
        extras.insert("imbalance_ratio".to_string(), ratio);
        Some(event(
            &depth.symbol,
            AnomalyKind::OrderBookImbalance,
            &tier.label,
            mid,
            ratio,
            config.imbalance_threshold,
            depth.ts,
            extras,
        ))
    }

    /// A sweep is a previously tracked wall vanishing between two snapshots
    /// while price moved through its level — i.e. it got eaten, not pulled.
    pub fn detect_sweep(
        &self,
        previous: &DepthSnapshot,
        current: &DepthSnapshot,
        tier: &TierConfig,
        config: &OrderBookConfig,
    ) -> Option<AnomalyEvent> {
        let mid = current.mid_price()?;
        for side in [BookSide::Bid, BookSide::Ask] {
            let key = (current.symbol.clone(), side);
            let wall = self.walls.lock().get(&key).cloned();
            let Some(wall) = wall else { continue };
            if wall.value < config.sweep_value_threshold {
                continue;
            }
            let still_present = match side {
                BookSide::Bid => previous
                    .bids
                    .iter()
                    .any(|(p, q)| (*p - wall.price).abs() < f64::EPSILON && *q >= wall.qty * 0.5),
                BookSide::Ask => previous
                    .asks
                    .iter()
                    .any(|(p, q)| (*p - wall.price).abs() < f64::EPSILON && *q >= wall.qty * 0.5),
            };
            let price_crossed_level = match side {
                BookSide::Bid => current.best_bid().map_or(false, |b| b < wall.price),
                BookSide::Ask => current.best_ask().map_or(false, |a| a > wall.price),
            };
            if still_present && price_crossed_level {
                let mut extras = HashMap::new();
                extras.insert("swept_price".to_string(), wall.price);
                extras.insert("swept_value".to_string(), wall.value);
                return Some(event(
                    &current.symbol,
                    AnomalyKind::OrderBookSweep,
                    &tier.label,
                    mid,
                    wall.value,
                    config.sweep_value_threshold,
                    current.ts,
                    extras,
                ));
            }
        }
        None
    }

    pub fn tracked_wall(&self, symbol: &str, side: BookSide) -> Option<WallState> {
        self.walls.lock().get(&(symbol.to_string(), side)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Ts {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn tier() -> TierConfig {
        TierConfig {
            min_oi_value: 0.0,
            price_threshold_pct: 2.0,
            volume_threshold_x: 3.0,
            oi_threshold_pct: 5.0,
            spread_threshold_pct: 0.5,
            label: "small".to_string(),
        }
    }

    fn depth_with_bid_wall(price: f64, qty: f64, ts: Ts) -> DepthSnapshot {
        DepthSnapshot {
            symbol: "BTCUSDT".to_string(),
            bids: vec![(price, qty), (price - 1.0, 1.0), (price - 2.0, 1.0)],
            asks: vec![(price + 1.0, 1.0), (price + 2.0, 1.0), (price + 3.0, 1.0)],
            last_update_id: 1,
            ts,
        }
    }

    #[test]
    fn wall_detected_once_on_first_seen() {
        let monitor = OrderBookMonitor::new();
        let config = OrderBookConfig::default();
        let depth = depth_with_bid_wall(100.0, 10_000.0, t0());
        let events = monitor.detect_walls(&depth, &tier(), &config);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnomalyKind::OrderBookWall);

        let events_again = monitor.detect_walls(&depth, &tier(), &config);
        assert!(events_again.is_empty());
    }

    #[test]
    fn imbalance_detected_when_skewed() {
        let monitor = OrderBookMonitor::new();
        let config = OrderBookConfig::default();
        let depth = DepthSnapshot {
            symbol: "BTCUSDT".to_string(),
            bids: vec![(100.0, 100.0)],
            asks: vec![(101.0, 1.0)],
            last_update_id: 1,
            ts: t0(),
        };
        let event = monitor.detect_imbalance(&depth, &tier(), &config);
        assert!(event.is_some());
    }
}
