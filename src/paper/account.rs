//! Virtual trading account: balance, margin accounting, equity curve.
//! Spec.md §4.8.1. Field layout and the apply-on-open/apply-on-close method
//! split follow the teacher's `vault/paper_ledger.rs::VaultPaperLedger`
//! (`cash_usdc`, `positions`, `apply_buy`/`apply_sell`), adapted from a spot
//! cash ledger to a margined perpetuals ledger.

use crate::config::AccountConfig;
use crate::models::{AccountState, ExitReason, Position, PositionSide, Trade, Ts};

#[derive(Debug, Clone)]
pub struct VirtualAccount {
    pub balance: f64,
    pub margin_used: f64,
    pub total_trades: u64,
    pub win_trades: u64,
    pub total_pnl: f64,
    pub peak_equity: f64,
    pub max_drawdown: f64,
    config: AccountConfig,
}

impl VirtualAccount {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            balance: config.initial_balance,
            margin_used: 0.0,
            total_trades: 0,
            win_trades: 0,
            total_pnl: 0.0,
            peak_equity: config.initial_balance,
            max_drawdown: 0.0,
            config,
        }
    }

    pub fn margin_available(&self) -> f64 {
        self.balance - self.margin_used
    }

    pub fn equity(&self, open_unrealized_pnl: f64) -> f64 {
        self.balance + open_unrealized_pnl
    }

    pub fn margin_ratio(&self, equity: f64) -> f64 {
        if equity <= 0.0 {
            return 1.0;
        }
        self.margin_used / equity
    }

    /// Can a new position of `margin` be opened without breaching
    /// `max_margin_ratio` or exceeding `max_positions`?
    pub fn can_open(&self, margin: f64, open_positions: usize, open_unrealized_pnl: f64) -> bool {
        if open_positions >= self.config.max_positions {
            return false;
        }
        if margin > self.margin_available() {
            return false;
        }
        let equity = self.equity(open_unrealized_pnl);
        let projected_ratio = (self.margin_used + margin) / equity.max(1e-9);
        projected_ratio <= self.config.max_margin_ratio
    }

    /// Margin sized by `position_risk_pct` of current equity.
    pub fn size_for(&self, open_unrealized_pnl: f64) -> f64 {
        self.equity(open_unrealized_pnl) * self.config.position_risk_pct / 100.0
    }

    pub fn commission(&self, notional: f64, is_taker: bool) -> f64 {
        let rate = if is_taker {
            self.config.taker_fee
        } else {
            self.config.maker_fee
        };
        notional * rate
    }

    pub fn apply_open(&mut self, position: &Position) {
        self.margin_used += position.margin;
        let commission = self.commission(position.margin * position.leverage, true);
        self.balance -= commission;
    }

    pub fn apply_close(&mut self, position: &Position, exit_price: f64, exit_ts: Ts, reason: ExitReason) -> Trade {
        let commission = self.commission(position.margin * position.leverage, true);
        let trade = Trade::from_close(position, exit_price, exit_ts, reason, commission);

        self.margin_used -= position.margin;
        self.balance += trade.realized_pnl;
        self.total_trades += 1;
        if trade.realized_pnl > 0.0 {
            self.win_trades += 1;
        }
        self.total_pnl += trade.realized_pnl;

        if self.balance > self.peak_equity {
            self.peak_equity = self.balance;
        }
        let drawdown = (self.peak_equity - self.balance) / self.peak_equity.max(1e-9) * 100.0;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }

        trade
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.win_trades as f64 / self.total_trades as f64 * 100.0
    }

    pub fn snapshot(&self, open_positions: usize, open_unrealized_pnl: f64, ts: Ts) -> AccountState {
        let equity = self.equity(open_unrealized_pnl);
        AccountState {
            ts,
            balance: self.balance,
            equity,
            margin_used: self.margin_used,
            margin_available: self.margin_available(),
            margin_ratio: self.margin_ratio(equity),
            open_positions,
            total_trades: self.total_trades,
            win_trades: self.win_trades,
            total_pnl: self.total_pnl,
            max_drawdown: self.max_drawdown,
            win_rate: self.win_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(margin: f64) -> Position {
        Position {
            id: "p1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            qty: 1.0,
            entry_price: 100.0,
            entry_ts: Utc::now(),
            leverage: 5.0,
            margin,
            take_profit: None,
            stop_loss: None,
            trailing_dist_pct: None,
            trailing_activation_pct: None,
            trailing_active: false,
            max_hold_sec: 3600,
            current_price: 100.0,
            highest_price: 100.0,
            lowest_price: 100.0,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            signal_confidence: 0.8,
            signal_reason: "test".to_string(),
        }
    }

    #[test]
    fn cannot_open_beyond_max_positions() {
        let account = VirtualAccount::new(AccountConfig {
            max_positions: 1,
            ..AccountConfig::default()
        });
        assert!(!account.can_open(100.0, 1, 0.0));
    }

    #[test]
    fn close_updates_balance_and_drawdown() {
        let mut account = VirtualAccount::new(AccountConfig::default());
        let mut pos = position(1000.0);
        account.apply_open(&pos);
        pos.update_pnl(90.0);
        let trade = account.apply_close(&pos, 90.0, Utc::now(), ExitReason::StopLoss);
        assert!(trade.realized_pnl < 0.0);
        assert_eq!(account.total_trades, 1);
        assert!(account.max_drawdown > 0.0);
    }
}
