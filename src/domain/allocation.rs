//! Translating a ranking snapshot into target holdings.
//!
//! Selection (which instruments) and weighting (how much of each) are kept
//! apart: an [`AllocationStrategy`] picks rows from the ranked candidates and
//! a [`Weighting`] turns the picked rows into a weight vector summing to one.

use crate::domain::error::RankfolioError;
use crate::domain::optimizer;
use crate::domain::price_series::PriceUniverse;
use crate::domain::ranking::RankRow;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Chooses target instruments from a ranking snapshot.
///
/// `candidates` arrive ordered by descending score. Implementations return
/// the chosen rows in the order they should be bought.
pub trait AllocationStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn select<'a>(&self, candidates: &[&'a RankRow]) -> Vec<&'a RankRow>;
}

/// The `n` highest-scoring instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct TopN {
    pub n: usize,
}

impl AllocationStrategy for TopN {
    fn name(&self) -> &str {
        "top_n"
    }

    fn select<'a>(&self, candidates: &[&'a RankRow]) -> Vec<&'a RankRow> {
        candidates.iter().take(self.n).copied().collect()
    }
}

/// Every instrument scoring at least `threshold`, optionally capped.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub threshold: f64,
    pub max_holdings: Option<usize>,
}

impl AllocationStrategy for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn select<'a>(&self, candidates: &[&'a RankRow]) -> Vec<&'a RankRow> {
        let limit = self.max_holdings.unwrap_or(usize::MAX);
        candidates
            .iter()
            .filter(|row| row.score >= self.threshold)
            .take(limit)
            .copied()
            .collect()
    }
}

/// The best `per_sector` instruments from each of the `sectors` sectors with
/// the highest mean score. Rows without a sector are never selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorRotation {
    pub sectors: usize,
    pub per_sector: usize,
}

impl AllocationStrategy for SectorRotation {
    fn name(&self) -> &str {
        "sector_rotation"
    }

    fn select<'a>(&self, candidates: &[&'a RankRow]) -> Vec<&'a RankRow> {
        let mut by_sector: BTreeMap<&str, Vec<&'a RankRow>> = BTreeMap::new();
        for &row in candidates {
            if let Some(sector) = row.sector.as_deref() {
                by_sector.entry(sector).or_default().push(row);
            }
        }

        let mut ranked: Vec<(&str, f64, Vec<&'a RankRow>)> = by_sector
            .into_iter()
            .map(|(sector, rows)| {
                let mean = rows.iter().map(|r| r.score).sum::<f64>() / rows.len() as f64;
                (sector, mean, rows)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        ranked
            .into_iter()
            .take(self.sectors)
            .flat_map(|(_, _, rows)| rows.into_iter().take(self.per_sector))
            .collect()
    }
}

/// How selected instruments share the capital.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Weighting {
    #[default]
    Equal,
    /// Proportional to market capitalisation from the snapshot.
    CapWeighted,
    /// Inverse volatility of trailing daily returns.
    RiskParity { lookback: usize },
    /// Long-only mean-variance over trailing daily returns.
    MeanVariance { lookback: usize },
}

impl Weighting {
    pub fn name(&self) -> &'static str {
        match self {
            Weighting::Equal => "equal",
            Weighting::CapWeighted => "cap_weighted",
            Weighting::RiskParity { .. } => "risk_parity",
            Weighting::MeanVariance { .. } => "mean_variance",
        }
    }

    /// Weights for `targets` as of `date`, summing to one.
    ///
    /// An empty result means no instrument qualifies and the portfolio
    /// should sit in cash. Return-based modes fall back to equal weights
    /// until every target has at least two trailing returns.
    pub fn weights(
        &self,
        targets: &[&RankRow],
        prices: &PriceUniverse,
        date: NaiveDate,
    ) -> Result<Vec<(String, f64)>, RankfolioError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Weighting::Equal => Ok(equal_weights(targets)),
            Weighting::CapWeighted => Ok(cap_weights(targets)),
            Weighting::RiskParity { lookback } => {
                let Some(returns) = aligned_returns(targets, prices, date, *lookback) else {
                    return Ok(equal_weights(targets));
                };
                let cov = optimizer::sample_covariance(&returns)?;
                if cov.iter().enumerate().all(|(i, row)| row[i] <= 0.0) {
                    tracing::debug!(%date, "all targets have zero volatility, using equal weights");
                    return Ok(equal_weights(targets));
                }
                let w = optimizer::risk_parity(&cov)?;
                Ok(label(targets, w))
            }
            Weighting::MeanVariance { lookback } => {
                let Some(returns) = aligned_returns(targets, prices, date, *lookback) else {
                    return Ok(equal_weights(targets));
                };
                let cov = optimizer::sample_covariance(&returns)?;
                let mu = optimizer::mean_returns(&returns);
                let raw = optimizer::mean_variance_direction(&mu, &cov)?;
                let weights = long_only(label(targets, raw));
                if weights.is_empty() {
                    tracing::debug!(%date, "no target has a positive mean-variance weight");
                }
                Ok(weights)
            }
        }
    }
}

pub fn equal_weights(targets: &[&RankRow]) -> Vec<(String, f64)> {
    let w = 1.0 / targets.len() as f64;
    targets
        .iter()
        .map(|row| (row.instrument.clone(), w))
        .collect()
}

/// Drops rows without a positive market cap; equal weights if none remain.
pub fn cap_weights(targets: &[&RankRow]) -> Vec<(String, f64)> {
    let capped: Vec<(&RankRow, f64)> = targets
        .iter()
        .filter_map(|row| match row.market_cap {
            Some(cap) if cap > 0.0 && cap.is_finite() => Some((*row, cap)),
            _ => None,
        })
        .collect();
    if capped.is_empty() {
        return equal_weights(targets);
    }
    let total: f64 = capped.iter().map(|(_, cap)| cap).sum();
    capped
        .into_iter()
        .map(|(row, cap)| (row.instrument.clone(), cap / total))
        .collect()
}

fn label(targets: &[&RankRow], weights: Vec<f64>) -> Vec<(String, f64)> {
    targets
        .iter()
        .zip(weights)
        .map(|(row, w)| (row.instrument.clone(), w))
        .collect()
}

/// Keeps strictly positive raw weights and rescales them to sum to one.
fn long_only(weights: Vec<(String, f64)>) -> Vec<(String, f64)> {
    let positive: Vec<(String, f64)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
    let total: f64 = positive.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    positive
        .into_iter()
        .map(|(id, w)| (id, w / total))
        .collect()
}

/// Trailing returns for every target, truncated to a common length.
/// `None` while any target has fewer than two returns.
fn aligned_returns(
    targets: &[&RankRow],
    prices: &PriceUniverse,
    date: NaiveDate,
    lookback: usize,
) -> Option<Vec<Vec<f64>>> {
    let series: Vec<Vec<f64>> = targets
        .iter()
        .map(|row| {
            prices
                .get(&row.instrument)
                .map(|s| s.trailing_returns(date, lookback))
                .unwrap_or_default()
        })
        .collect();
    let common = series.iter().map(Vec::len).min().unwrap_or(0);
    if common < 2 {
        return None;
    }
    Some(
        series
            .into_iter()
            .map(|r| r[r.len() - common..].to_vec())
            .collect(),
    )
}
