use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;

use crate::account::Ledger;

/// A performance snapshot computable on demand from the ledger.
///
/// Every figure derives from net P&L; unrealized P&L is marked to the last
/// tick price per symbol.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub account_equity: Decimal,
    pub realized_net_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_return_pct: Decimal,
    /// Closed trades only; absent until the first trade closes.
    pub win_rate_pct: Option<Decimal>,
    /// Sum of winning nets over |sum of losing nets|.
    pub profit_factor: Option<Decimal>,
    pub max_drawdown_pct: Decimal,
    pub open_position_count: usize,
    pub total_trades: usize,
    pub trades_today: usize,
    pub total_fees_paid: Decimal,
}

impl PerformanceSnapshot {
    /// Derives the snapshot at `now`, marking open positions to `marks`.
    pub fn compute(ledger: &Ledger, marks: &HashMap<String, Decimal>, now: DateTime<Utc>) -> Self {
        let trades = ledger.closed_trades();
        let realized_net_pnl = ledger.account_equity() - ledger.initial_equity();

        let mut winning_net = Decimal::ZERO;
        let mut losing_net = Decimal::ZERO;
        let mut wins = 0usize;
        for trade in trades {
            if trade.net_pnl > Decimal::ZERO {
                wins += 1;
                winning_net += trade.net_pnl;
            } else {
                losing_net += trade.net_pnl.abs();
            }
        }

        let win_rate_pct = (!trades.is_empty()).then(|| {
            Decimal::from(wins as u64) / Decimal::from(trades.len() as u64) * dec!(100)
        });
        let profit_factor = (losing_net > Decimal::ZERO).then(|| winning_net / losing_net);

        let total_return_pct = if ledger.initial_equity() > Decimal::ZERO {
            realized_net_pnl / ledger.initial_equity() * dec!(100)
        } else {
            Decimal::ZERO
        };

        let today = now.date_naive();
        let trades_today = trades
            .iter()
            .filter(|t| t.exit_time.date_naive() == today)
            .count();

        Self {
            timestamp: now,
            account_equity: ledger.account_equity(),
            realized_net_pnl,
            unrealized_pnl: ledger.unrealized_pnl(marks),
            total_return_pct,
            win_rate_pct,
            profit_factor,
            max_drawdown_pct: max_drawdown_pct(ledger),
            open_position_count: ledger.open_position_count(),
            total_trades: trades.len(),
            trades_today,
            total_fees_paid: ledger.total_fees_paid(),
        }
    }
}

/// Maximum peak-to-trough decline along the equity curve, as a percentage
/// of the peak in force at the time.
fn max_drawdown_pct(ledger: &Ledger) -> Decimal {
    let mut peak = ledger.initial_equity();
    let mut max_dd = Decimal::ZERO;
    for &(_, equity) in ledger.equity_curve() {
        if equity > peak {
            peak = equity;
        }
        if peak > Decimal::ZERO {
            let dd = (peak - equity) / peak * dec!(100);
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}
