use configuration::Persistence;
use core_types::{ClosedTrade, Position};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::LedgerError;

/// Write-through file persistence for the ledger's two artifacts.
///
/// The trade log is append-only JSON lines, one record per closed trade,
/// written on every close. The open-position snapshot is a single JSON
/// document rewritten on every change (via a temp file and rename, so a
/// crash never leaves a half-written snapshot).
#[derive(Debug, Clone)]
pub struct LedgerPersistence {
    trade_log_path: PathBuf,
    open_positions_path: PathBuf,
}

impl LedgerPersistence {
    pub fn new(settings: &Persistence) -> Result<Self, LedgerError> {
        let this = Self {
            trade_log_path: PathBuf::from(&settings.trade_log_path),
            open_positions_path: PathBuf::from(&settings.open_positions_path),
        };
        ensure_parent(&this.trade_log_path)?;
        ensure_parent(&this.open_positions_path)?;
        Ok(this)
    }

    /// Appends one closed trade to the log.
    pub fn append_trade(&self, trade: &ClosedTrade) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.trade_log_path)?;
        let line = serde_json::to_string(trade)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Reads the whole trade log back. Malformed lines are skipped with a
    /// warning rather than poisoning the log.
    pub fn load_trades(&self) -> Result<Vec<ClosedTrade>, LedgerError> {
        if !self.trade_log_path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.trade_log_path)?);
        let mut trades = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClosedTrade>(&line) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(line = number + 1, error = %e, "skipping malformed trade record"),
            }
        }
        Ok(trades)
    }

    /// Overwrites the open-position snapshot.
    pub fn write_open_positions(&self, positions: &[Position]) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(positions)?;
        let tmp = self.open_positions_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.open_positions_path)?;
        Ok(())
    }

    /// Loads the open-position snapshot; an absent file means no open
    /// positions.
    pub fn load_open_positions(&self) -> Result<Vec<Position>, LedgerError> {
        if !self.open_positions_path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.open_positions_path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&json)?)
    }
}

fn ensure_parent(path: &Path) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use core_types::{ExitReason, Side};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn settings(dir: &Path) -> Persistence {
        Persistence {
            trade_log_path: dir.join("trades.jsonl").to_string_lossy().into_owned(),
            open_positions_path: dir.join("open.json").to_string_lossy().into_owned(),
        }
    }

    fn trade() -> ClosedTrade {
        ClosedTrade {
            position_id: Uuid::new_v4(),
            symbol: "ETHUSDT".to_string(),
            side: Side::Short,
            entry_price: dec!(100),
            entry_time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            exit_price: dec!(101.5),
            exit_time: DateTime::from_timestamp_millis(1_700_000_060_000).unwrap(),
            quantity: dec!(1),
            leverage: 10,
            exit_reason: ExitReason::TrailingStop,
            gross_pnl: dec!(-15.2015),
            fees_paid: dec!(0.10075),
            slippage_cost: dec!(0.2015),
            net_pnl: dec!(-15.30225),
        }
    }

    #[test]
    fn trade_log_round_trips_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LedgerPersistence::new(&settings(dir.path())).unwrap();

        let first = trade();
        let second = trade();
        persistence.append_trade(&first).unwrap();
        persistence.append_trade(&second).unwrap();

        let loaded = persistence.load_trades().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn open_snapshot_is_overwritten_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LedgerPersistence::new(&settings(dir.path())).unwrap();

        let position = Position {
            position_id: Uuid::new_v4(),
            symbol: "SOLUSDT".to_string(),
            side: Side::Long,
            entry_price: dec!(150),
            entry_time: DateTime::UNIX_EPOCH,
            quantity: dec!(2),
            leverage: 5,
            extreme_favorable_price: dec!(152),
            current_stop_price: dec!(148.5),
            opened_by_signal_id: Uuid::new_v4(),
        };
        persistence.write_open_positions(&[position.clone()]).unwrap();
        assert_eq!(persistence.load_open_positions().unwrap(), vec![position]);

        persistence.write_open_positions(&[]).unwrap();
        assert!(persistence.load_open_positions().unwrap().is_empty());
    }

    #[test]
    fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LedgerPersistence::new(&settings(dir.path())).unwrap();
        assert!(persistence.load_trades().unwrap().is_empty());
        assert!(persistence.load_open_positions().unwrap().is_empty());
    }

    #[test]
    fn malformed_log_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LedgerPersistence::new(&settings(dir.path())).unwrap();
        let good = trade();
        persistence.append_trade(&good).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("trades.jsonl"))
            .unwrap()
            .write_all(b"{ not json }\n")
            .unwrap();
        persistence.append_trade(&good).unwrap();

        assert_eq!(persistence.load_trades().unwrap().len(), 2);
    }
}
