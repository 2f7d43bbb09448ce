//! Report output port trait.

use crate::domain::error::RankfolioError;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::Trade;
use crate::domain::walkforward::WalkForwardRow;
use std::path::Path;

pub trait ReportPort {
    /// Writes one row per window. Fails before touching `path` if
    /// `rows.len() != expected`.
    fn write_walk_forward(
        &self,
        rows: &[WalkForwardRow],
        expected: usize,
        path: &Path,
    ) -> Result<(), RankfolioError>;

    fn write_equity_curve(&self, curve: &[EquityPoint], path: &Path) -> Result<(), RankfolioError>;

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), RankfolioError>;
}
