//! CSV file data adapter.
//!
//! Prices live in `<base>/<INSTRUMENT>.csv` with a `date,close,volume`
//! header (volume may be omitted). Rankings are a single file with a
//! `date,instrument,score,market_cap,sector` header where the last two
//! columns may be blank or absent.

use crate::domain::error::RankfolioError;
use crate::domain::price::PriceBar;
use crate::domain::ranking::RankRow;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
    rankings_path: Option<PathBuf>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            rankings_path: None,
        }
    }

    pub fn with_rankings(mut self, path: PathBuf) -> Self {
        self.rankings_path = Some(path);
        self
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}.csv"))
    }
}

fn load_error(reason: impl Into<String>) -> RankfolioError {
    RankfolioError::DataLoad {
        reason: reason.into(),
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<fs::File>, RankfolioError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| load_error(format!("failed to read {}: {e}", path.display())))
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn required_column(
    headers: &csv::StringRecord,
    name: &str,
    path: &Path,
) -> Result<usize, RankfolioError> {
    column(headers, name)
        .ok_or_else(|| load_error(format!("{}: missing {name} column", path.display())))
}

fn parse_date(value: &str, line: u64) -> Result<NaiveDate, RankfolioError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| load_error(format!("line {line}: invalid date {value:?}: {e}")))
}

fn parse_f64(value: &str, what: &str, line: u64) -> Result<f64, RankfolioError> {
    value
        .parse()
        .map_err(|e| load_error(format!("line {line}: invalid {what} {value:?}: {e}")))
}

fn optional<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty())
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankfolioError> {
        let path = self.csv_path(instrument);
        let mut rdr = open_reader(&path)?;
        let headers = rdr.headers()?.clone();
        let date_col = required_column(&headers, "date", &path)?;
        let close_col = required_column(&headers, "close", &path)?;
        let volume_col = column(&headers, "volume");

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date = parse_date(record.get(date_col).unwrap_or(""), line)?;
            if date < start || date > end {
                continue;
            }

            let close = parse_f64(record.get(close_col).unwrap_or(""), "close", line)?;
            if !(close > 0.0 && close.is_finite()) {
                return Err(load_error(format!(
                    "{} line {line}: close must be positive, got {close}",
                    path.display()
                )));
            }
            let volume: i64 = match optional(&record, volume_col) {
                Some(v) => v
                    .parse::<f64>()
                    .map(|v| v as i64)
                    .map_err(|e| load_error(format!("line {line}: invalid volume {v:?}: {e}")))?,
                None => 0,
            };

            bars.push(PriceBar::new(date, close, volume));
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, RankfolioError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            load_error(format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ))
        })?;

        let rankings_name = self
            .rankings_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_os_string());

        let mut instruments = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if rankings_name.as_deref() == path.file_name() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                instruments.push(stem.to_string());
            }
        }

        instruments.sort();
        Ok(instruments)
    }

    fn fetch_rankings(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RankRow>, RankfolioError> {
        let path = self
            .rankings_path
            .as_ref()
            .ok_or_else(|| load_error("no rankings file configured"))?;
        let mut rdr = open_reader(path)?;
        let headers = rdr.headers()?.clone();
        let date_col = required_column(&headers, "date", path)?;
        let instrument_col = required_column(&headers, "instrument", path)?;
        let score_col = required_column(&headers, "score", path)?;
        let cap_col = column(&headers, "market_cap");
        let sector_col = column(&headers, "sector");

        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date = parse_date(record.get(date_col).unwrap_or(""), line)?;
            if date < start || date > end {
                continue;
            }
            let instrument = record.get(instrument_col).unwrap_or("");
            if instrument.is_empty() {
                return Err(load_error(format!("line {line}: empty instrument")));
            }
            if !seen.insert((date, instrument.to_string())) {
                return Err(load_error(format!(
                    "line {line}: duplicate ranking for {instrument} on {date}"
                )));
            }

            let score = parse_f64(record.get(score_col).unwrap_or(""), "score", line)?;
            let mut row = RankRow::new(date, instrument, score);
            if let Some(cap) = optional(&record, cap_col) {
                row = row.with_market_cap(parse_f64(cap, "market_cap", line)?);
            }
            if let Some(sector) = optional(&record, sector_col) {
                row = row.with_sector(sector);
            }
            rows.push(row);
        }

        Ok(rows)
    }
}
