//! Daily closing-price bar.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
    /// Shares traded; zero when the source carries no volume.
    pub volume: i64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, close: f64, volume: i64) -> Self {
        PriceBar {
            date,
            close,
            volume,
        }
    }

    /// close * volume
    pub fn traded_value(&self) -> f64 {
        self.close * self.volume as f64
    }
}
