//! Market data port trait.

use crate::domain::error::RankfolioError;
use crate::domain::price::PriceBar;
use crate::domain::ranking::RankRow;
use chrono::NaiveDate;

/// Source of already-fetched prices and rankings.
///
/// Implementations return bars sorted by date and restricted to
/// `start..=end`. The engine never calls a port itself; everything is
/// loaded before a run starts.
pub trait DataPort {
    fn fetch_prices(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankfolioError>;

    fn list_instruments(&self) -> Result<Vec<String>, RankfolioError>;

    fn fetch_rankings(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<RankRow>, RankfolioError>;
}
