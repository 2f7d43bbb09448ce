//! Delimited-text report writer.
//!
//! Every file gets a header row followed by one row per record. Floats are
//! written with their full `Display` precision.

use crate::domain::error::RankfolioError;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::Trade;
use crate::domain::walkforward::WalkForwardRow;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }

    /// Serialises `records` to any writer, header first.
    pub fn write_records<W: Write, T: Serialize>(
        writer: W,
        records: &[T],
        header: &[&str],
    ) -> Result<(), RankfolioError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(header)?;
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_file<T: Serialize>(
        path: &Path,
        records: &[T],
        header: &[&str],
    ) -> Result<(), RankfolioError> {
        let file = std::fs::File::create(path)?;
        Self::write_records(file, records, header)
    }
}

pub const WALK_FORWARD_HEADER: [&str; 5] =
    ["window_start", "window_end", "cagr", "sharpe", "max_drawdown"];
pub const EQUITY_HEADER: [&str; 2] = ["date", "equity"];
pub const TRADES_HEADER: [&str; 6] = ["date", "instrument", "side", "price", "shares", "value"];

impl ReportPort for CsvReportAdapter {
    fn write_walk_forward(
        &self,
        rows: &[WalkForwardRow],
        expected: usize,
        path: &Path,
    ) -> Result<(), RankfolioError> {
        if rows.len() != expected {
            return Err(RankfolioError::ReportInvalid {
                reason: format!(
                    "walk-forward has {} rows but {expected} windows",
                    rows.len()
                ),
            });
        }
        Self::write_file(path, rows, &WALK_FORWARD_HEADER)
    }

    fn write_equity_curve(&self, curve: &[EquityPoint], path: &Path) -> Result<(), RankfolioError> {
        Self::write_file(path, curve, &EQUITY_HEADER)
    }

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), RankfolioError> {
        Self::write_file(path, trades, &TRADES_HEADER)
    }
}
