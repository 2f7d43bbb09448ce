#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rankfolio::domain::backtest::BacktestConfig;
use rankfolio::domain::cost::CostModel;
use rankfolio::domain::error::RankfolioError;
pub use rankfolio::domain::price::PriceBar;
use rankfolio::domain::price_series::{PriceSeries, PriceUniverse};
pub use rankfolio::domain::ranking::{RankRow, RankingSeries};
use rankfolio::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub rankings: Vec<RankRow>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            rankings: Vec::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_rankings(mut self, rows: Vec<RankRow>) -> Self {
        self.rankings = rows;
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankfolioError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(RankfolioError::DataLoad {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(instrument)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_instruments(&self) -> Result<Vec<String>, RankfolioError> {
        let mut instruments: Vec<String> = self.data.keys().cloned().collect();
        instruments.sort();
        Ok(instruments)
    }

    fn fetch_rankings(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RankRow>, RankfolioError> {
        Ok(self
            .rankings
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect())
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Consecutive calendar days from 2020-01-01.
pub fn day(i: usize) -> NaiveDate {
    date("2020-01-01") + Duration::days(i as i64)
}

pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar::new(day(i), c, 1_000_000))
        .collect()
}

/// `start * (1 + rate)^i` for `n` days.
pub fn geometric_closes(start: f64, rate: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start * (1.0 + rate).powi(i as i32)).collect()
}

pub fn universe(series: &[(&str, Vec<f64>)]) -> PriceUniverse {
    let mut u = PriceUniverse::new();
    for (id, closes) in series {
        u.insert(PriceSeries::new(*id, make_bars(closes)));
    }
    u
}

/// One snapshot per date with the same scores every time.
pub fn constant_rankings(dates: &[NaiveDate], scores: &[(&str, f64)]) -> Vec<RankRow> {
    dates
        .iter()
        .flat_map(|d| scores.iter().map(move |(id, s)| RankRow::new(*d, *id, *s)))
        .collect()
}

pub fn frictionless(interval: usize) -> BacktestConfig {
    BacktestConfig {
        rebalance_interval: interval,
        cost: CostModel::frictionless(),
        ..Default::default()
    }
}

pub fn write_price_csv(dir: &Path, instrument: &str, closes: &[f64]) {
    let mut content = String::from("date,close,volume\n");
    for bar in make_bars(closes) {
        content.push_str(&format!("{},{},{}\n", bar.date, bar.close, bar.volume));
    }
    fs::write(dir.join(format!("{instrument}.csv")), content).unwrap();
}

pub fn write_rankings_csv(path: &Path, rows: &[RankRow]) {
    let mut content = String::from("date,instrument,score,market_cap,sector\n");
    for row in rows {
        content.push_str(&format!(
            "{},{},{},{},{}\n",
            row.date,
            row.instrument,
            row.score,
            row.market_cap.map(|c| c.to_string()).unwrap_or_default(),
            row.sector.clone().unwrap_or_default()
        ));
    }
    fs::write(path, content).unwrap();
}
