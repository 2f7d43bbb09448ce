//! Multi-asset rebalancing engine.
//!
//! Walks the unified trading calendar of every instrument. Each day the
//! portfolio is marked to the latest close at or before that day. Every
//! `rebalance_interval` days the ranking snapshot in force is handed to an
//! [`AllocationStrategy`]; holdings outside the new target set are sold and
//! the freed cash is spread across the targets by the configured
//! [`Weighting`]. Between rebalances holdings are left alone.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::allocation::{AllocationStrategy, Weighting};
use super::cost::CostModel;
use super::error::RankfolioError;
use super::liquidity::{self, LiquidityConfig};
use super::metrics::{self, Metrics};
use super::portfolio::{EquityPoint, Portfolio};
use super::position::Trade;
use super::price_series::PriceUniverse;
use super::ranking::{RankRow, RankingSeries};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100.0;
pub const DEFAULT_REBALANCE_INTERVAL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Trading days between rebalances.
    pub rebalance_interval: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cost: CostModel,
    pub weighting: Weighting,
    /// Sizer and filter, off when `None`.
    pub liquidity: Option<LiquidityConfig>,
    /// Annual rate used for Sharpe and Sortino.
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            rebalance_interval: DEFAULT_REBALANCE_INTERVAL,
            start_date: None,
            end_date: None,
            cost: CostModel::default(),
            weighting: Weighting::Equal,
            liquidity: None,
            risk_free_rate: 0.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), RankfolioError> {
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        if self.rebalance_interval == 0 {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "rebalance_interval",
                "must be at least 1",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RankfolioError::invalid_config(
                    "backtest",
                    "start_date",
                    format!("{start} is after end_date {end}"),
                ));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "risk_free_rate",
                "must be a finite number",
            ));
        }
        match self.weighting {
            Weighting::RiskParity { lookback } | Weighting::MeanVariance { lookback }
                if lookback < 2 =>
            {
                return Err(RankfolioError::invalid_config(
                    "allocation",
                    "lookback",
                    format!("must be at least 2, got {lookback}"),
                ));
            }
            _ => {}
        }
        if let Some(liq) = &self.liquidity {
            if liq.lookback == 0 {
                return Err(RankfolioError::invalid_config(
                    "liquidity",
                    "lookback",
                    "must be at least 1",
                ));
            }
            if !(liq.max_adtv_fraction > 0.0 && liq.max_adtv_fraction <= 1.0) {
                return Err(RankfolioError::invalid_config(
                    "liquidity",
                    "max_adtv_fraction",
                    format!("must be in (0, 1], got {}", liq.max_adtv_fraction),
                ));
            }
            if liq.min_adtv < 0.0 || liq.min_avg_volume < 0.0 {
                return Err(RankfolioError::invalid_config(
                    "liquidity",
                    "min_adtv",
                    "minimums must not be negative",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub metrics: Metrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    /// Summed per-instrument return contributions.
    pub attribution: BTreeMap<String, f64>,
}

impl BacktestResult {
    pub fn annualized_return(&self) -> f64 {
        self.metrics.annualized_return
    }

    pub fn sharpe_ratio(&self) -> f64 {
        self.metrics.sharpe_ratio
    }

    pub fn max_drawdown(&self) -> f64 {
        self.metrics.max_drawdown
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

/// Runs one rebalanced simulation.
///
/// The equity on each date is marked before that date's trades, so the
/// curve starts at exactly `initial_capital` and trading costs show up from
/// the following day. Fails only on invalid configuration, an empty calendar
/// or an optimizer failure; missing prices and empty target sets are logged
/// and skipped.
pub fn run_backtest(
    prices: &PriceUniverse,
    rankings: &RankingSeries,
    strategy: &dyn AllocationStrategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, RankfolioError> {
    config.validate()?;

    let timeline: Vec<NaiveDate> = prices
        .timeline()
        .into_iter()
        .filter(|d| config.start_date.is_none_or(|s| *d >= s))
        .filter(|d| config.end_date.is_none_or(|e| *d <= e))
        .collect();
    if timeline.is_empty() {
        return Err(RankfolioError::insufficient("trading dates", 0, 1));
    }

    tracing::debug!(
        strategy = strategy.name(),
        weighting = config.weighting.name(),
        dates = timeline.len(),
        instruments = prices.len(),
        "starting backtest"
    );

    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut weight_history: Vec<HashMap<String, f64>> = Vec::new();
    let mut return_history: Vec<HashMap<String, f64>> = Vec::new();
    let mut weights_in_force: HashMap<String, f64> = HashMap::new();

    for (index, &date) in timeline.iter().enumerate() {
        let close_as_of = |id: &str| prices.get(id).and_then(|s| s.close_as_of(date));

        if index > 0 {
            let prev = timeline[index - 1];
            let returns: HashMap<String, f64> = weights_in_force
                .keys()
                .filter_map(|id| {
                    let series = prices.get(id)?;
                    let before = series.close_as_of(prev)?;
                    let now = series.close_as_of(date)?;
                    (before > 0.0).then(|| (id.clone(), now / before - 1.0))
                })
                .collect();
            weight_history.push(std::mem::take(&mut weights_in_force));
            return_history.push(returns);
        }

        let equity = portfolio.total_equity(close_as_of);
        portfolio.record_equity(date, equity);

        if index % config.rebalance_interval == 0 {
            rebalance(&mut portfolio, prices, rankings, strategy, config, date)?;
        }

        weights_in_force = portfolio.weights(close_as_of);
    }

    let metrics = Metrics::from_curve(&portfolio.equity_curve, config.risk_free_rate);
    let attribution = metrics::attribution(&weight_history, &return_history);

    Ok(BacktestResult {
        metrics,
        equity_curve: portfolio.equity_curve,
        trades: portfolio.trades,
        attribution,
    })
}

fn rebalance(
    portfolio: &mut Portfolio,
    prices: &PriceUniverse,
    rankings: &RankingSeries,
    strategy: &dyn AllocationStrategy,
    config: &BacktestConfig,
    date: NaiveDate,
) -> Result<(), RankfolioError> {
    let snapshot: &[RankRow] = rankings
        .snapshot_as_of(date)
        .map(|(_, rows)| rows)
        .unwrap_or(&[]);

    let candidates: Vec<&RankRow> = match &config.liquidity {
        Some(liq) => liquidity::filter_candidates(snapshot, prices, date, liq),
        None => snapshot.iter().collect(),
    };
    let selected = strategy.select(&candidates);
    let weights = config.weighting.weights(&selected, prices, date)?;

    if weights.is_empty() {
        let absorbed = RankfolioError::EmptyTargetSet { date };
        tracing::warn!(%absorbed, "holding cash until the next rebalance");
    }

    let targets: HashSet<&str> = weights.iter().map(|(id, _)| id.as_str()).collect();
    let to_sell: Vec<String> = portfolio
        .holdings
        .keys()
        .filter(|id| !targets.contains(id.as_str()))
        .cloned()
        .collect();
    for instrument in to_sell {
        match prices.get(&instrument).and_then(|s| s.close_on(date)) {
            Some(close) => {
                portfolio.sell_all(&instrument, close, date, &config.cost);
            }
            None => log_missing_price(&instrument, date),
        }
    }

    let cash = portfolio.cash;
    let mut budgets: Vec<(String, f64)> = weights
        .into_iter()
        .map(|(id, w)| (id, cash * w))
        .collect();
    if let Some(liq) = &config.liquidity {
        let adtv = liquidity::adtv_map(
            budgets.iter().map(|(id, _)| id.as_str()),
            prices,
            date,
            liq.lookback,
        );
        budgets = liquidity::size_positions(&budgets, &adtv, liq);
    }

    for (instrument, budget) in budgets {
        if budget <= 0.0 {
            continue;
        }
        match prices.get(&instrument).and_then(|s| s.close_on(date)) {
            Some(close) => {
                portfolio.buy(&instrument, close, budget, date, &config.cost);
            }
            None => log_missing_price(&instrument, date),
        }
    }

    tracing::debug!(
        %date,
        candidates = candidates.len(),
        holdings = portfolio.holding_count(),
        cash = portfolio.cash,
        "rebalanced"
    );
    Ok(())
}

fn log_missing_price(instrument: &str, date: NaiveDate) {
    let absorbed = RankfolioError::MissingPrice {
        instrument: instrument.to_string(),
        date,
    };
    tracing::warn!(%absorbed, "skipping trade");
}
