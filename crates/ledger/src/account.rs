use chrono::{DateTime, Utc};
use configuration::Simulation;
use core_types::{ClosedTrade, ExitReason, Position, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

use crate::error::LedgerError;
use crate::persistence::LedgerPersistence;

/// Per-symbol aggregates over closed trades.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolStats {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub net_pnl: Decimal,
    pub fees_paid: Decimal,
    pub last_entry_time: Option<DateTime<Utc>>,
}

/// The long and short slots for one symbol. At most one of each may be
/// occupied at any instant.
#[derive(Debug, Clone, Default)]
struct SideSlots {
    long: Option<Position>,
    short: Option<Position>,
}

impl SideSlots {
    fn slot_mut(&mut self, side: Side) -> &mut Option<Position> {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    fn is_empty(&self) -> bool {
        self.long.is_none() && self.short.is_none()
    }
}

/// The account state machine. It applies entries and exits, accrues fees,
/// and tracks the equity curve; it makes no trading decisions.
pub struct Ledger {
    initial_equity: Decimal,
    account_equity: Decimal,
    peak_equity: Decimal,
    open: HashMap<String, SideSlots>,
    closed_trades: Vec<ClosedTrade>,
    per_symbol: HashMap<String, SymbolStats>,
    total_fees_paid: Decimal,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    sim: Simulation,
    persistence: Option<LedgerPersistence>,
}

impl Ledger {
    pub fn new(initial_equity: Decimal, sim: Simulation) -> Self {
        Self {
            initial_equity,
            account_equity: initial_equity,
            peak_equity: initial_equity,
            open: HashMap::new(),
            closed_trades: Vec::new(),
            per_symbol: HashMap::new(),
            total_fees_paid: Decimal::ZERO,
            equity_curve: Vec::new(),
            sim,
            persistence: None,
        }
    }

    /// Attaches the file persistence (trade log + open-position snapshot).
    pub fn with_persistence(mut self, persistence: LedgerPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Loads still-open positions from the snapshot written by a previous
    /// run. They must be resumed (or manually flattened); the engine never
    /// auto-closes on shutdown.
    pub fn resume_open_positions(&mut self) -> Result<Vec<Position>, LedgerError> {
        let Some(persistence) = &self.persistence else {
            return Ok(Vec::new());
        };
        let positions = persistence.load_open_positions()?;
        for position in &positions {
            self.register_open(position.clone())?;
        }
        if !positions.is_empty() {
            info!(count = positions.len(), "resumed open positions from snapshot");
        }
        Ok(positions)
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    pub fn account_equity(&self) -> Decimal {
        self.account_equity
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn total_fees_paid(&self) -> Decimal {
        self.total_fees_paid
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        &self.equity_curve
    }

    pub fn per_symbol_stats(&self) -> &HashMap<String, SymbolStats> {
        &self.per_symbol
    }

    pub fn open_position_count(&self) -> usize {
        self.open
            .values()
            .map(|slots| slots.long.iter().count() + slots.short.iter().count())
            .sum()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .open
            .values()
            .flat_map(|slots| slots.long.iter().chain(slots.short.iter()).cloned())
            .collect();
        positions.sort_by(|a, b| (&a.symbol, a.side as u8).cmp(&(&b.symbol, b.side as u8)));
        positions
    }

    /// Registers a freshly opened position and persists the new snapshot.
    pub fn open_position(&mut self, position: Position) -> Result<(), LedgerError> {
        let entry_time = position.entry_time;
        let symbol = position.symbol.clone();
        self.register_open(position)?;
        self.per_symbol
            .entry(symbol)
            .or_default()
            .last_entry_time = Some(entry_time);
        self.persist_open_snapshot()?;
        Ok(())
    }

    fn register_open(&mut self, position: Position) -> Result<(), LedgerError> {
        let slots = self.open.entry(position.symbol.clone()).or_default();
        let slot = slots.slot_mut(position.side);
        if slot.is_some() {
            return Err(LedgerError::DuplicateSide {
                symbol: position.symbol.clone(),
                side: position.side,
            });
        }
        *slot = Some(position);
        Ok(())
    }

    pub fn position(&self, symbol: &str, side: Side) -> Option<&Position> {
        let slots = self.open.get(symbol)?;
        match side {
            Side::Long => slots.long.as_ref(),
            Side::Short => slots.short.as_ref(),
        }
    }

    pub fn has_open(&self, symbol: &str) -> bool {
        self.open.get(symbol).is_some_and(|slots| !slots.is_empty())
    }

    /// Updates the mirrored extreme/stop fields on an open position so the
    /// persisted snapshot reflects the live stop state.
    pub fn update_stop_state(
        &mut self,
        symbol: &str,
        side: Side,
        extreme: Decimal,
        stop: Decimal,
    ) -> Result<(), LedgerError> {
        let slots = self
            .open
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;
        let position = slots
            .slot_mut(side)
            .as_mut()
            .ok_or_else(|| LedgerError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;
        position.extreme_favorable_price = extreme;
        position.current_stop_price = stop;
        Ok(())
    }

    /// Closes an open position: computes slippage-folded gross P&L, fees
    /// on the raw reference prices, removes the position from the open
    /// set, appends the trade, and updates equity.
    ///
    /// A position is closed exactly once; a second close of the same slot
    /// reports `PositionNotFound`.
    pub fn close_position(
        &mut self,
        symbol: &str,
        side: Side,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
        exit_fee_rate: Decimal,
    ) -> Result<ClosedTrade, LedgerError> {
        let slots = self
            .open
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;
        let position = slots
            .slot_mut(side)
            .take()
            .ok_or_else(|| LedgerError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;
        if slots.is_empty() {
            self.open.remove(symbol);
        }

        let trade = self.settle(position, exit_price, exit_time, exit_reason, exit_fee_rate);

        self.account_equity += trade.net_pnl;
        self.peak_equity = self.peak_equity.max(self.account_equity);
        self.total_fees_paid += trade.fees_paid;
        self.equity_curve.push((exit_time, self.account_equity));

        let stats = self.per_symbol.entry(symbol.to_string()).or_default();
        stats.trades += 1;
        if trade.net_pnl > Decimal::ZERO {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.net_pnl += trade.net_pnl;
        stats.fees_paid += trade.fees_paid;

        if let Some(persistence) = &self.persistence {
            persistence.append_trade(&trade)?;
        }
        self.closed_trades.push(trade.clone());
        self.persist_open_snapshot()?;

        info!(
            symbol,
            side = %side,
            exit_reason = %exit_reason,
            net_pnl = %trade.net_pnl,
            equity = %self.account_equity,
            "position closed"
        );
        Ok(trade)
    }

    /// The close arithmetic. Slippage hits both the entry and the exit
    /// side of the gross figure; fees are charged on the raw prices.
    fn settle(
        &self,
        position: Position,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
        exit_fee_rate: Decimal,
    ) -> ClosedTrade {
        let slip = self.sim.slippage_pct;
        let leverage = Decimal::from(position.leverage);
        let quantity = position.quantity;
        let entry = position.entry_price;
        let one = Decimal::ONE;

        let (gross, gross_without_slip) = match position.side {
            Side::Long => (
                (exit_price * (one - slip) - entry * (one + slip)) * quantity * leverage,
                (exit_price - entry) * quantity * leverage,
            ),
            Side::Short => (
                (entry * (one - slip) - exit_price * (one + slip)) * quantity * leverage,
                (entry - exit_price) * quantity * leverage,
            ),
        };
        let slippage_cost = gross_without_slip - gross;

        let fees = entry * quantity * self.sim.taker_fee_pct + exit_price * quantity * exit_fee_rate;
        let net = gross - fees;

        ClosedTrade {
            position_id: position.position_id,
            symbol: position.symbol,
            side: position.side,
            entry_price: entry,
            entry_time: position.entry_time,
            exit_price,
            exit_time,
            quantity,
            leverage: position.leverage,
            exit_reason,
            gross_pnl: gross,
            fees_paid: fees,
            slippage_cost,
            net_pnl: net,
        }
    }

    /// Unrealized P&L of all open positions marked to the given prices.
    /// Symbols without a mark contribute nothing.
    pub fn unrealized_pnl(&self, marks: &HashMap<String, Decimal>) -> Decimal {
        let mut total = Decimal::ZERO;
        for (symbol, slots) in &self.open {
            let Some(mark) = marks.get(symbol) else {
                continue;
            };
            for position in slots.long.iter().chain(slots.short.iter()) {
                let leverage = Decimal::from(position.leverage);
                let pnl = match position.side {
                    Side::Long => (*mark - position.entry_price) * position.quantity * leverage,
                    Side::Short => (position.entry_price - *mark) * position.quantity * leverage,
                };
                total += pnl;
            }
        }
        total
    }

    fn persist_open_snapshot(&self) -> Result<(), LedgerError> {
        if let Some(persistence) = &self.persistence {
            persistence.write_open_positions(&self.open_positions())?;
        }
        Ok(())
    }

    /// Forces the open-position snapshot to disk with the latest mirrored
    /// stop state. Called on shutdown; open positions are never auto-closed.
    pub fn persist_open_positions(&self) -> Result<(), LedgerError> {
        self.persist_open_snapshot()
    }
}
