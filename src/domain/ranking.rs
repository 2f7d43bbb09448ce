//! Ranked candidates per date, as produced by an external scoring step.

use crate::domain::error::RankfolioError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct RankRow {
    pub date: NaiveDate,
    pub instrument: String,
    pub score: f64,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
}

impl RankRow {
    pub fn new(date: NaiveDate, instrument: impl Into<String>, score: f64) -> Self {
        RankRow {
            date,
            instrument: instrument.into(),
            score,
            market_cap: None,
            sector: None,
        }
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }
}

/// Ranking snapshots keyed by date. Rows within a snapshot are ordered by
/// descending score, ties broken by instrument id.
#[derive(Debug, Clone, Default)]
pub struct RankingSeries {
    snapshots: BTreeMap<NaiveDate, Vec<RankRow>>,
}

impl RankingSeries {
    /// Groups rows by date. Fails on a repeated (date, instrument) pair.
    pub fn new(rows: Vec<RankRow>) -> Result<Self, RankfolioError> {
        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
        let mut snapshots: BTreeMap<NaiveDate, Vec<RankRow>> = BTreeMap::new();

        for row in rows {
            if !seen.insert((row.date, row.instrument.clone())) {
                return Err(RankfolioError::InvalidInput {
                    reason: format!(
                        "duplicate ranking row for {} on {}",
                        row.instrument, row.date
                    ),
                });
            }
            snapshots.entry(row.date).or_default().push(row);
        }

        for rows in snapshots.values_mut() {
            sort_snapshot(rows);
        }

        Ok(Self { snapshots })
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of distinct snapshot dates.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn row_count(&self) -> usize {
        self.snapshots.values().map(Vec::len).sum()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.snapshots.keys().copied()
    }

    pub fn snapshot(&self, date: NaiveDate) -> Option<&[RankRow]> {
        self.snapshots.get(&date).map(Vec::as_slice)
    }

    /// Latest snapshot dated on or before `date`.
    pub fn snapshot_as_of(&self, date: NaiveDate) -> Option<(NaiveDate, &[RankRow])> {
        self.snapshots
            .range(..=date)
            .next_back()
            .map(|(d, rows)| (*d, rows.as_slice()))
    }

    /// Snapshots with `start <= date <= end`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> RankingSeries {
        if start > end {
            return RankingSeries::default();
        }
        let snapshots = self
            .snapshots
            .range(start..=end)
            .map(|(d, rows)| (*d, rows.clone()))
            .collect();
        RankingSeries { snapshots }
    }
}

fn sort_snapshot(rows: &mut [RankRow]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
}
