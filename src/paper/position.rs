//! Position lifecycle and exit evaluation, spec.md §4.8.2. Exit checks run
//! in a fixed precedence — take-profit, then stop-loss (which by this point
//! includes any trailing ratchet), then max hold time, then liquidation —
//! so a single tick never reports two simultaneous exit reasons.

use crate::models::{ExitReason, Position, PositionSide, Ts};

/// Liquidation triggers once losses consume the whole margin.
const LIQUIDATION_PNL_PCT: f64 = -95.0;

pub fn check_exit(position: &Position, now: Ts) -> Option<ExitReason> {
    if position.unrealized_pnl_pct <= LIQUIDATION_PNL_PCT {
        return Some(ExitReason::Liquidation);
    }
    if let Some(tp) = position.take_profit {
        let hit = match position.side {
            PositionSide::Long => position.current_price >= tp,
            PositionSide::Short => position.current_price <= tp,
        };
        if hit {
            return Some(ExitReason::TakeProfit);
        }
    }
    if let Some(sl) = position.stop_loss {
        let hit = match position.side {
            PositionSide::Long => position.current_price <= sl,
            PositionSide::Short => position.current_price >= sl,
        };
        if hit {
            return Some(if position.trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            });
        }
    }
    if position.hold_sec(now) >= position.max_hold_sec {
        return Some(ExitReason::TimeExit);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn base_position() -> Position {
        Position {
            id: "p1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            qty: 1.0,
            entry_price: 100.0,
            entry_ts: Utc::now(),
            leverage: 5.0,
            margin: 100.0,
            take_profit: Some(110.0),
            stop_loss: Some(95.0),
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
    fn take_profit_wins_over_time_exit() {
        let mut position = base_position();
        position.update_pnl(111.0);
        let reason = check_exit(&position, position.entry_ts + Duration::seconds(10_000));
        assert_eq!(reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_triggers_below_level() {
        let mut position = base_position();
        position.update_pnl(94.0);
        let reason = check_exit(&position, position.entry_ts + Duration::seconds(10));
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn trailing_stop_reported_once_active() {
        let mut position = base_position();
        position.trailing_active = true;
        position.update_pnl(94.0);
        let reason = check_exit(&position, position.entry_ts + Duration::seconds(10));
        assert_eq!(reason, Some(ExitReason::TrailingStop));
    }

    #[test]
    fn time_exit_after_max_hold() {
        let position = base_position();
        let reason = check_exit(&position, position.entry_ts + Duration::seconds(3601));
        assert_eq!(reason, Some(ExitReason::TimeExit));
    }

    #[test]
    fn no_exit_within_bounds() {
        let position = base_position();
        let reason = check_exit(&position, position.entry_ts + Duration::seconds(10));
        assert_eq!(reason, None);
    }
}
