//! Orchestrates open/close across all symbols: spec.md §4.8.5. Ties
//! together `VirtualAccount`, `StopLossManager`, `Strategy`, and the
//! exit-precedence check in `position.rs`. Orchestration style (iterate
//! positions, mutate in place, collect closed trades) follows the teacher's
//! `vault/paper_ledger.rs` top-level tick loop.

use super::account::VirtualAccount;
use super::position::check_exit;
use super::stop_loss::StopLossManager;
use super::strategy::{Strategy, TradeSignal};
use crate::config::{StopLossConfig, StrategyConfig};
use crate::models::{ExitReason, FeatureVector, Position, Trade, Ts};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct PositionManager {
    pub positions: HashMap<String, Position>,
    strategy: Strategy,
    stop_loss: StopLossManager,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_positions_for(&self, symbol: &str) -> usize {
        self.positions.values().filter(|p| p.symbol == symbol).count()
    }

    pub fn total_unrealized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Evaluates a strategy signal and opens a position if the account and
    /// per-symbol position limits allow it.
    pub fn maybe_open(
        &mut self,
        account: &mut VirtualAccount,
        feature: &FeatureVector,
        strategy_config: &StrategyConfig,
        stop_loss_config: &StopLossConfig,
        leverage: f64,
        max_positions_per_symbol: usize,
        atr: Option<f64>,
        now: Ts,
    ) -> Option<TradeSignal> {
        if self.open_positions_for(&feature.symbol) >= max_positions_per_symbol {
            return None;
        }
        let signal = self.strategy.evaluate(feature, strategy_config)?;
        let margin = account.size_for(self.total_unrealized_pnl());
        if !account.can_open(margin, self.positions.len(), self.total_unrealized_pnl()) {
            return None;
        }

        let stop_loss = self
            .stop_loss
            .initial_stop(feature.price, signal.side, stop_loss_config, atr);
        let take_profit = self.stop_loss.take_profit(feature.price, signal.side, stop_loss_config);

        let position = Position {
            id: Uuid::new_v4().to_string(),
            symbol: feature.symbol.clone(),
            side: signal.side,
            qty: margin * leverage / feature.price,
            entry_price: feature.price,
            entry_ts: now,
            leverage,
            margin,
            take_profit: Some(take_profit),
            stop_loss: Some(stop_loss),
            trailing_dist_pct: Some(stop_loss_config.trailing_distance_pct),
            trailing_activation_pct: Some(stop_loss_config.trailing_activation_pct),
            trailing_active: false,
            max_hold_sec: stop_loss_config.max_hold_sec,
            current_price: feature.price,
            highest_price: feature.price,
            lowest_price: feature.price,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            signal_confidence: signal.confidence,
            signal_reason: signal.reason.clone(),
        };

        account.apply_open(&position);
        self.positions.insert(position.id.clone(), position);
        Some(signal)
    }

    /// Marks every open position to `price`, ratchets trailing stops, and
    /// closes whatever hits an exit condition. Returns the resulting trades.
    pub fn mark_and_check_exits(
        &mut self,
        account: &mut VirtualAccount,
        symbol: &str,
        price: f64,
        stop_loss_config: &StopLossConfig,
        now: Ts,
    ) -> Vec<Trade> {
        let mut closed = Vec::new();
        let ids: Vec<String> = self
            .positions
            .iter()
            .filter(|(_, p)| p.symbol == symbol)
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            let Some(position) = self.positions.get_mut(&id) else { continue };
            position.update_pnl(price);
            self.stop_loss.update_trailing(position, stop_loss_config);

            if let Some(reason) = check_exit(position, now) {
                let position = self.positions.remove(&id).unwrap();
                let trade = account.apply_close(&position, price, now, reason);
                closed.push(trade);
            }
        }
        closed
    }

    pub fn close_all(&mut self, account: &mut VirtualAccount, price_by_symbol: &HashMap<String, f64>, now: Ts) -> Vec<Trade> {
        let mut closed = Vec::new();
        let ids: Vec<String> = self.positions.keys().cloned().collect();
        for id in ids {
            let Some(position) = self.positions.remove(&id) else { continue };
            let price = price_by_symbol
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.current_price);
            let trade = account.apply_close(&position, price, now, ExitReason::Manual);
            closed.push(trade);
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use chrono::Utc;

    fn feature(symbol: &str, price: f64) -> FeatureVector {
        FeatureVector {
            symbol: symbol.to_string(),
            ts: Utc::now(),
            price,
            price_change_60s: None,
            price_change_300s: Some(3.0),
            price_change_900s: None,
            volatility_60s: Some(0.5),
            volatility_300s: None,
            volume_ratio_6: Some(1.2),
            volume_ratio_30: None,
            oi_delta_5m: None,
            oi_delta_15m: None,
            spread_pct: None,
            imbalance_5: None,
            imbalance_10: Some(0.3),
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
            rsi_14: Some(25.0),
            macd_line: Some(1.0),
            macd_signal: Some(0.5),
            macd_hist: Some(0.5),
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
    fn opens_and_closes_on_take_profit() {
        let mut manager = PositionManager::new();
        let mut account = VirtualAccount::new(AccountConfig::default());
        let strategy_config = StrategyConfig::default();
        let stop_loss_config = StopLossConfig::default();
        let now = Utc::now();

        let signal = manager.maybe_open(
            &mut account,
            &feature("BTCUSDT", 100.0),
            &strategy_config,
            &stop_loss_config,
            5.0,
            1,
            None,
            now,
        );
        assert!(signal.is_some());
        assert_eq!(manager.positions.len(), 1);

        let trades = manager.mark_and_check_exits(
            &mut account,
            "BTCUSDT",
            110.0,
            &stop_loss_config,
            now + chrono::Duration::seconds(60),
        );
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::TakeProfit);
        assert!(manager.positions.is_empty());
    }
}
