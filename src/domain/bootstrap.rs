//! Bootstrap confidence interval for maximum drawdown.
//!
//! Period returns of an equity curve are resampled with replacement, each
//! resample is compounded back into a synthetic curve from the same starting
//! value, and the 2.5th/97.5th percentiles of the synthetic maximum
//! drawdowns bound the realised one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::error::RankfolioError;
use super::metrics::{max_drawdown, period_returns};

pub const DEFAULT_RESAMPLES: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    pub resamples: usize,
    /// Fixed seed for reproducible intervals; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            resamples: DEFAULT_RESAMPLES,
            seed: None,
        }
    }
}

/// Signed drawdown fractions, `ci95_low <= ci95_high <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownInterval {
    pub ci95_low: f64,
    pub ci95_high: f64,
    /// Drawdown of the curve that was resampled.
    pub observed: f64,
}

impl DrawdownInterval {
    pub fn contains(&self, drawdown: f64) -> bool {
        drawdown >= self.ci95_low && drawdown <= self.ci95_high
    }
}

pub fn bootstrap_pnl(
    equity: &[f64],
    config: &BootstrapConfig,
) -> Result<DrawdownInterval, RankfolioError> {
    if equity.len() < 2 {
        return Err(RankfolioError::insufficient(
            "bootstrap equity points",
            equity.len(),
            2,
        ));
    }
    if config.resamples == 0 {
        return Err(RankfolioError::invalid_config(
            "bootstrap",
            "resamples",
            "must be at least 1",
        ));
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let returns = period_returns(equity);
    let start = equity[0];
    let mut path = Vec::with_capacity(equity.len());
    let mut drawdowns = Vec::with_capacity(config.resamples);

    for _ in 0..config.resamples {
        path.clear();
        path.push(start);
        let mut value = start;
        for _ in 0..returns.len() {
            value *= 1.0 + returns[rng.gen_range(0..returns.len())];
            path.push(value);
        }
        drawdowns.push(max_drawdown(&path));
    }
    drawdowns.sort_by(f64::total_cmp);

    let interval = DrawdownInterval {
        ci95_low: percentile(&drawdowns, 0.025),
        ci95_high: percentile(&drawdowns, 0.975),
        observed: max_drawdown(equity),
    };
    tracing::debug!(
        resamples = config.resamples,
        low = interval.ci95_low,
        high = interval.ci95_high,
        observed = interval.observed,
        "bootstrap complete"
    );
    Ok(interval)
}

/// Linear interpolation between closest ranks of sorted data.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seeded(seed: u64) -> BootstrapConfig {
        BootstrapConfig {
            resamples: 500,
            seed: Some(seed),
        }
    }

    fn noisy_curve(seed: u64, len: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut value = 100.0;
        let mut curve = vec![value];
        for _ in 1..len {
            value *= 1.0 + rng.gen_range(-0.02..0.021);
            curve.push(value);
        }
        curve
    }

    #[test]
    fn single_point_is_insufficient() {
        let err = bootstrap_pnl(&[100.0], &BootstrapConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RankfolioError::InsufficientData { have: 1, need: 2, .. }
        ));
    }

    #[test]
    fn zero_resamples_is_invalid() {
        let cfg = BootstrapConfig {
            resamples: 0,
            seed: Some(1),
        };
        assert!(bootstrap_pnl(&[100.0, 101.0], &cfg).is_err());
    }

    #[test]
    fn same_seed_same_interval() {
        let curve = noisy_curve(7, 120);
        let a = bootstrap_pnl(&curve, &seeded(42)).unwrap();
        let b = bootstrap_pnl(&curve, &seeded(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn interval_is_ordered_and_non_positive() {
        let curve = noisy_curve(3, 200);
        let ci = bootstrap_pnl(&curve, &seeded(9)).unwrap();
        assert!(ci.ci95_low <= ci.ci95_high);
        assert!(ci.ci95_high <= 0.0);
    }

    #[test]
    fn rising_curve_has_zero_interval() {
        let curve: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let ci = bootstrap_pnl(&curve, &seeded(1)).unwrap();
        assert_eq!(ci.ci95_low, 0.0);
        assert_eq!(ci.ci95_high, 0.0);
        assert_eq!(ci.observed, 0.0);
    }

    #[test]
    fn observed_drawdown_usually_inside_interval() {
        let covered = (0..40)
            .filter(|&seed| {
                let curve = noisy_curve(seed, 250);
                let ci = bootstrap_pnl(&curve, &seeded(seed + 1000)).unwrap();
                ci.contains(ci.observed)
            })
            .count();
        assert!(covered >= 30, "observed inside interval for {covered}/40 curves");
    }

    #[test]
    fn input_curve_is_not_mutated() {
        let curve = noisy_curve(5, 60);
        let before = curve.clone();
        let _ = bootstrap_pnl(&curve, &seeded(2)).unwrap();
        assert_eq!(curve, before);
    }

    #[test]
    fn percentile_interpolates() {
        let data = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_relative_eq!(percentile(&data, 0.5), 20.0);
        assert_relative_eq!(percentile(&data, 0.125), 5.0);
        assert_relative_eq!(percentile(&data, 1.0), 40.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }
}
