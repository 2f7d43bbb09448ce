//! Per-instrument price series with a date index, and the unified trading calendar.

use crate::domain::price::PriceBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub instrument: String,
    pub bars: Vec<PriceBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    /// Builds the series, sorting bars by date. Later duplicates of a date win.
    pub fn new(instrument: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by(|later, earlier| {
            if later.date == earlier.date {
                *earlier = later.clone();
                true
            } else {
                false
            }
        });
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            instrument: instrument.into(),
            bars,
            date_index,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Close printed exactly on `date`.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.get_bar(date).map(|b| b.close)
    }

    /// Index of the last bar dated on or before `date`.
    pub fn index_as_of(&self, date: NaiveDate) -> Option<usize> {
        if let Some(&i) = self.date_index.get(&date) {
            return Some(i);
        }
        let after = self.bars.partition_point(|b| b.date <= date);
        after.checked_sub(1)
    }

    /// Most recent close on or before `date`.
    pub fn close_as_of(&self, date: NaiveDate) -> Option<f64> {
        self.index_as_of(date).map(|i| self.bars[i].close)
    }

    /// Up to `lookback` bars ending at the last bar on or before `date`.
    pub fn trailing(&self, date: NaiveDate, lookback: usize) -> &[PriceBar] {
        match self.index_as_of(date) {
            Some(end) => {
                let start = (end + 1).saturating_sub(lookback);
                &self.bars[start..=end]
            }
            None => &[],
        }
    }

    /// Average daily traded value over the trailing window; zero without data.
    pub fn adtv(&self, date: NaiveDate, lookback: usize) -> f64 {
        let window = self.trailing(date, lookback);
        if window.is_empty() {
            return 0.0;
        }
        window.iter().map(|b| b.traded_value()).sum::<f64>() / window.len() as f64
    }

    /// Average daily share volume over the trailing window; zero without data.
    pub fn average_volume(&self, date: NaiveDate, lookback: usize) -> f64 {
        let window = self.trailing(date, lookback);
        if window.is_empty() {
            return 0.0;
        }
        window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64
    }

    /// Simple returns of the `lookback + 1` bars ending on or before `date`.
    pub fn trailing_returns(&self, date: NaiveDate, lookback: usize) -> Vec<f64> {
        self.trailing(date, lookback + 1)
            .windows(2)
            .map(|w| {
                if w[0].close > 0.0 {
                    w[1].close / w[0].close - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Bars with `start <= date <= end`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect();
        PriceSeries::new(self.instrument.clone(), bars)
    }
}

/// All instrument series for one simulation, keyed by instrument id.
#[derive(Debug, Clone, Default)]
pub struct PriceUniverse {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bars(bars: HashMap<String, Vec<PriceBar>>) -> Self {
        let mut universe = Self::new();
        for (instrument, series) in bars {
            universe.insert(PriceSeries::new(instrument, series));
        }
        universe
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.instrument.clone(), series);
    }

    pub fn get(&self, instrument: &str) -> Option<&PriceSeries> {
        self.series.get(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.series.values().filter_map(PriceSeries::first_date).min()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.series.values().filter_map(PriceSeries::last_date).max()
    }

    /// Every series restricted to `[start, end]`; instruments left empty are dropped.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> PriceUniverse {
        let series = self
            .series
            .iter()
            .map(|(id, s)| (id.clone(), s.slice(start, end)))
            .filter(|(_, s)| !s.is_empty())
            .collect();
        PriceUniverse { series }
    }

    pub fn timeline(&self) -> Vec<NaiveDate> {
        build_unified_timeline(self.series.values())
    }
}

/// Sorted union of every trading date in `series`.
pub fn build_unified_timeline<'a>(series: impl IntoIterator<Item = &'a PriceSeries>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .into_iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
