//! Stop-loss computation, spec.md §4.8.3: fixed percentage, ATR-multiple,
//! trailing, or whichever of the three is tightest ("multiple" mode).

use crate::config::{StopLossConfig, StopLossMethod};
use crate::models::{Position, PositionSide};

#[derive(Debug, Clone, Default)]
pub struct StopLossManager;

impl StopLossManager {
    pub fn new() -> Self {
        Self
    }

    /// Stop-loss price at entry, before any trailing activates.
    pub fn initial_stop(&self, entry_price: f64, side: PositionSide, config: &StopLossConfig, atr: Option<f64>) -> f64 {
        let fixed = Self::offset_price(entry_price, side, config.fixed_stop_pct / 100.0);
        match config.method {
            StopLossMethod::Fixed => fixed,
            StopLossMethod::Trailing => fixed,
            StopLossMethod::Atr => {
                let atr_pct = atr.map(|a| a / entry_price).unwrap_or(config.fixed_stop_pct / 100.0);
                Self::offset_price(entry_price, side, atr_pct * config.atr_multiplier)
            }
            StopLossMethod::Multiple => {
                let atr_pct = atr.map(|a| a / entry_price).unwrap_or(config.fixed_stop_pct / 100.0);
                let atr_stop = Self::offset_price(entry_price, side, atr_pct * config.atr_multiplier);
                Self::tightest(entry_price, side, &[fixed, atr_stop])
            }
        }
    }

    pub fn take_profit(&self, entry_price: f64, side: PositionSide, config: &StopLossConfig) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 + config.take_profit_pct / 100.0),
            PositionSide::Short => entry_price * (1.0 - config.take_profit_pct / 100.0),
        }
    }

    fn offset_price(entry_price: f64, side: PositionSide, pct: f64) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 - pct),
            PositionSide::Short => entry_price * (1.0 + pct),
        }
    }

    /// Of several candidate stops, the one closest to entry (least room to run).
    fn tightest(entry_price: f64, side: PositionSide, candidates: &[f64]) -> f64 {
        candidates
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = (entry_price - a).abs();
                let db = (entry_price - b).abs();
                da.partial_cmp(&db).unwrap()
            })
            .unwrap_or_else(|| Self::offset_price(entry_price, side, 0.02))
    }

    /// Ratchets a trailing stop up (long) / down (short) once price has moved
    /// `trailing_activation_pct` in the position's favor, never loosening it.
    pub fn update_trailing(&self, position: &mut Position, config: &StopLossConfig) {
        if config.method != StopLossMethod::Trailing && config.method != StopLossMethod::Multiple {
            return;
        }
        let favorable_move_pct = match position.side {
            PositionSide::Long => (position.highest_price - position.entry_price) / position.entry_price * 100.0,
            PositionSide::Short => (position.entry_price - position.lowest_price) / position.entry_price * 100.0,
        };
        if favorable_move_pct < config.trailing_activation_pct {
            return;
        }
        position.trailing_active = true;
        let distance = config.trailing_distance_pct / 100.0;
        let candidate = match position.side {
            PositionSide::Long => position.highest_price * (1.0 - distance),
            PositionSide::Short => position.lowest_price * (1.0 + distance),
        };
        let tighter = match (position.side, position.stop_loss) {
            (PositionSide::Long, Some(existing)) => candidate.max(existing),
            (PositionSide::Short, Some(existing)) => candidate.min(existing),
            (_, None) => candidate,
        };
        position.stop_loss = Some(tighter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_stop_is_below_entry_for_long() {
        let manager = StopLossManager::new();
        let config = StopLossConfig {
            method: StopLossMethod::Fixed,
            ..StopLossConfig::default()
        };
        let stop = manager.initial_stop(100.0, PositionSide::Long, &config, None);
        assert!(stop < 100.0);
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let manager = StopLossManager::new();
        let config = StopLossConfig {
            method: StopLossMethod::Trailing,
            trailing_activation_pct: 1.0,
            trailing_distance_pct: 1.0,
            ..StopLossConfig::default()
        };
        let mut position = Position {
            id: "p".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            qty: 1.0,
            entry_price: 100.0,
            entry_ts: chrono::Utc::now(),
            leverage: 1.0,
            margin: 100.0,
            take_profit: None,
            stop_loss: Some(98.0),
            trailing_dist_pct: Some(1.0),
            trailing_activation_pct: Some(1.0),
            trailing_active: false,
            max_hold_sec: 3600,
            current_price: 105.0,
            highest_price: 105.0,
            lowest_price: 100.0,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            signal_confidence: 0.8,
            signal_reason: "test".to_string(),
        };
        manager.update_trailing(&mut position, &config);
        let first_stop = position.stop_loss.unwrap();
        assert!(first_stop > 98.0);

        position.highest_price = 103.0; // pulled back, should not loosen stop
        manager.update_trailing(&mut position, &config);
        assert!(position.stop_loss.unwrap() >= first_stop);
    }
}
