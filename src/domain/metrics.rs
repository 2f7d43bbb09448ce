//! Performance statistics over an equity curve.
//!
//! One convention for every engine: simple period-over-period returns,
//! 252 periods per year, geometric annualised return, population standard
//! deviation.

use super::portfolio::EquityPoint;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Signed, at most zero.
    pub max_drawdown: f64,
    /// Longest run of periods spent below a prior peak.
    pub max_drawdown_duration: usize,
}

impl Metrics {
    pub fn compute(values: &[f64], risk_free_rate: f64) -> Self {
        let returns = period_returns(values);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;

        Metrics {
            total_return: total_return(values),
            annualized_return: annualized_return(values),
            annualized_volatility: annualized_volatility(&returns),
            sharpe_ratio: sharpe_ratio(&returns, daily_rf),
            sortino_ratio: sortino_ratio(&returns, daily_rf),
            max_drawdown: max_drawdown(values),
            max_drawdown_duration: max_drawdown_duration(values),
        }
    }

    pub fn from_curve(curve: &[EquityPoint], risk_free_rate: f64) -> Self {
        let values: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        Self::compute(&values, risk_free_rate)
    }
}

pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

pub fn total_return(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// `(final / initial)^(252 / n) - 1` where `n` is the number of return periods.
pub fn annualized_return(values: &[f64]) -> f64 {
    let periods = values.len().saturating_sub(1);
    if periods == 0 {
        return 0.0;
    }
    let growth = 1.0 + total_return(values);
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0
}

fn mean_and_stddev(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn annualized_volatility(returns: &[f64]) -> f64 {
    mean_and_stddev(returns).1 * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn sharpe_ratio(returns: &[f64], daily_rf: f64) -> f64 {
    let (mean, stddev) = mean_and_stddev(returns);
    if stddev > 0.0 {
        (mean - daily_rf) / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

pub fn sortino_ratio(returns: &[f64], daily_rf: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();
    if downside_stddev > 0.0 {
        (mean - daily_rf) / downside_stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Deepest peak-to-trough decline as a negative fraction of the peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = v / peak - 1.0;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

pub fn max_drawdown_duration(values: &[f64]) -> usize {
    let mut peak = f64::NEG_INFINITY;
    let mut current = 0usize;
    let mut longest = 0usize;
    for &v in values {
        if v >= peak {
            peak = v;
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}

/// Per-instrument contribution `Σ_t weight_i(t) · return_i(t)`.
///
/// `weights[t]` holds the weights in force over period `t` and `returns[t]`
/// the instrument returns realised over that same period. An instrument
/// with a weight but no return for a period contributes nothing for it.
pub fn attribution(
    weights: &[HashMap<String, f64>],
    returns: &[HashMap<String, f64>],
) -> BTreeMap<String, f64> {
    let mut contributions: BTreeMap<String, f64> = BTreeMap::new();
    for (w, r) in weights.iter().zip(returns) {
        for (instrument, weight) in w {
            let ret = r.get(instrument).copied().unwrap_or(0.0);
            *contributions.entry(instrument.clone()).or_insert(0.0) += weight * ret;
        }
    }
    contributions
}
