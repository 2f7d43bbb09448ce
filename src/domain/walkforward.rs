//! Walk-forward evaluation over rolling calendar windows.
//!
//! Window `k` covers `[anchor + k·step, anchor + k·step + 12·years)` in
//! calendar months, with the end made inclusive by stepping back one day.
//! Offsets are always taken from the anchor so month-end clamping never
//! accumulates. Windows are produced while their inclusive end is on or
//! before the last available price date, which makes the window count
//! exactly [`expected_window_count`].

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use super::allocation::AllocationStrategy;
use super::backtest::{run_backtest, BacktestConfig, BacktestResult};
use super::error::RankfolioError;
use super::price_series::PriceUniverse;
use super::ranking::RankingSeries;

pub const DEFAULT_WINDOW_YEARS: u32 = 1;
pub const DEFAULT_STEP_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardConfig {
    pub start: NaiveDate,
    pub window_years: u32,
    pub step_months: u32,
}

impl WalkForwardConfig {
    pub fn new(start: NaiveDate) -> Self {
        WalkForwardConfig {
            start,
            window_years: DEFAULT_WINDOW_YEARS,
            step_months: DEFAULT_STEP_MONTHS,
        }
    }

    pub fn validate(&self) -> Result<(), RankfolioError> {
        if self.window_years == 0 {
            return Err(RankfolioError::invalid_config(
                "walkforward",
                "window_years",
                "must be at least 1",
            ));
        }
        if self.step_months == 0 {
            return Err(RankfolioError::invalid_config(
                "walkforward",
                "step_months",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    fn window_months(&self) -> u32 {
        self.window_years * 12
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalkForwardWindow {
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
}

/// Lazily yields windows until one would end after `max_date`.
#[derive(Debug, Clone)]
pub struct Windows {
    anchor: NaiveDate,
    window_months: u32,
    step_months: u32,
    max_date: NaiveDate,
    next: u32,
}

impl Iterator for Windows {
    type Item = WalkForwardWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.checked_mul(self.step_months)?;
        let start = add_months(self.anchor, offset)?;
        let end = add_months(self.anchor, offset.checked_add(self.window_months)?)?
            - Duration::days(1);
        if end > self.max_date {
            return None;
        }
        self.next += 1;
        Some(WalkForwardWindow { start, end })
    }
}

pub fn windows(config: &WalkForwardConfig, max_date: NaiveDate) -> Windows {
    Windows {
        anchor: config.start,
        window_months: config.window_months(),
        step_months: config.step_months,
        max_date,
        next: 0,
    }
}

/// `date` moved by whole calendar months, the day clamped to the month end.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = date.month0() as i64 + months as i64;
    let year = date.year() as i64 + total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let year = i32::try_from(year).ok()?;
    let day = date.day().min(days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}

/// Number of whole calendar months from `start` covered by data ending on
/// `end` (inclusive): the largest `m` with `add_months(start, m) <= end + 1 day`.
pub fn full_months_between(start: NaiveDate, end: NaiveDate) -> u32 {
    let limit = end + Duration::days(1);
    if limit <= start {
        return 0;
    }
    let rough = (limit.year() - start.year()) * 12 + limit.month() as i32 - start.month() as i32;
    let mut months = rough.max(0) as u32;
    while months > 0 && add_months(start, months).is_none_or(|d| d > limit) {
        months -= 1;
    }
    months
}

/// `floor((total_months - 12·window_years) / step_months) + 1`, or zero when
/// the history is shorter than one window.
pub fn expected_window_count(total_months: u32, window_years: u32, step_months: u32) -> usize {
    let window_months = window_years * 12;
    if step_months == 0 || total_months < window_months {
        return 0;
    }
    ((total_months - window_months) / step_months + 1) as usize
}

/// One window's backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub result: BacktestResult,
}

/// Delimited-text row for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkForwardRow {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

impl From<&WindowResult> for WalkForwardRow {
    fn from(w: &WindowResult) -> Self {
        WalkForwardRow {
            window_start: w.window.start,
            window_end: w.window.end,
            cagr: w.result.annualized_return(),
            sharpe: w.result.sharpe_ratio(),
            max_drawdown: w.result.max_drawdown(),
        }
    }
}

/// Every window plus the count the closed form predicts for this history.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardReport {
    pub windows: Vec<WindowResult>,
    pub expected_windows: usize,
}

impl WalkForwardReport {
    pub fn rows(&self) -> Vec<WalkForwardRow> {
        self.windows.iter().map(WalkForwardRow::from).collect()
    }
}

/// Backtests each window on prices and rankings restricted to that window.
///
/// A failure in any window aborts the sweep. Windows share only the
/// read-only inputs, so with the `parallel` feature they run on the rayon
/// pool; results stay in window order either way.
pub fn run_walk_forward(
    prices: &PriceUniverse,
    rankings: &RankingSeries,
    strategy: &dyn AllocationStrategy,
    backtest: &BacktestConfig,
    config: &WalkForwardConfig,
) -> Result<WalkForwardReport, RankfolioError> {
    config.validate()?;
    backtest.validate()?;
    let max_date = prices
        .max_date()
        .ok_or_else(|| RankfolioError::insufficient("walk-forward price dates", 0, 1))?;

    let planned: Vec<WalkForwardWindow> = windows(config, max_date).collect();
    let expected = expected_window_count(
        full_months_between(config.start, max_date),
        config.window_years,
        config.step_months,
    );
    if planned.len() != expected {
        return Err(RankfolioError::InvalidInput {
            reason: format!("generated {} windows, expected {expected}", planned.len()),
        });
    }
    tracing::info!(windows = planned.len(), %max_date, "walk-forward plan");

    let run_window = |window: &WalkForwardWindow| -> Result<WindowResult, RankfolioError> {
        let window_prices = prices.slice(window.start, window.end);
        let window_rankings = rankings.slice(window.start, window.end);
        let window_config = BacktestConfig {
            start_date: Some(window.start),
            end_date: Some(window.end),
            ..backtest.clone()
        };
        let result = run_backtest(&window_prices, &window_rankings, strategy, &window_config)?;
        tracing::info!(
            start = %window.start,
            end = %window.end,
            cagr = result.annualized_return(),
            sharpe = result.sharpe_ratio(),
            "window complete"
        );
        Ok(WindowResult {
            window: *window,
            result,
        })
    };

    #[cfg(feature = "parallel")]
    let windows = {
        use rayon::prelude::*;
        planned
            .par_iter()
            .map(run_window)
            .collect::<Result<Vec<_>, _>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let windows = planned
        .iter()
        .map(run_window)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WalkForwardReport {
        windows,
        expected_windows: expected,
    })
}
