//! Moving-average crossover on a single instrument.
//!
//! Two states, flat and long. A flat position goes long when the fast SMA
//! crosses above the slow SMA; a long position goes flat when the close
//! drops below the stop (a fixed fraction under the entry price) or below
//! the slow SMA. Whatever is held on the last bar is sold at its close.

use std::collections::{BTreeMap, HashMap};

use super::backtest::{BacktestResult, DEFAULT_INITIAL_CAPITAL};
use super::cost::CostModel;
use super::error::RankfolioError;
use super::indicator::sma::calculate_sma;
use super::metrics::{self, Metrics};
use super::portfolio::Portfolio;
use super::price::PriceBar;

pub const DEFAULT_FAST_PERIOD: usize = 20;
pub const DEFAULT_SLOW_PERIOD: usize = 60;
pub const DEFAULT_STOP_PCT: f64 = 0.08;

#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverConfig {
    pub fast: usize,
    pub slow: usize,
    /// Stop distance below the entry price, as a fraction.
    pub stop_pct: f64,
    pub initial_capital: f64,
    pub cost: CostModel,
    pub risk_free_rate: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        CrossoverConfig {
            fast: DEFAULT_FAST_PERIOD,
            slow: DEFAULT_SLOW_PERIOD,
            stop_pct: DEFAULT_STOP_PCT,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            cost: CostModel::default(),
            risk_free_rate: 0.0,
        }
    }
}

impl CrossoverConfig {
    pub fn validate(&self) -> Result<(), RankfolioError> {
        if self.fast == 0 {
            return Err(RankfolioError::invalid_config(
                "single",
                "fast",
                "must be at least 1",
            ));
        }
        if self.fast >= self.slow {
            return Err(RankfolioError::invalid_config(
                "single",
                "slow",
                format!("must exceed fast ({} >= {})", self.fast, self.slow),
            ));
        }
        if !(self.stop_pct > 0.0 && self.stop_pct < 1.0) {
            return Err(RankfolioError::invalid_config(
                "single",
                "stop_pct",
                format!("must be in (0, 1), got {}", self.stop_pct),
            ));
        }
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        Ok(())
    }
}

/// Runs the crossover strategy over `bars`, which must be sorted by date.
///
/// The equity curve has one point per bar. Signals are first evaluated on
/// bar `slow`, once both averages have a valid previous value.
pub fn run_crossover(
    instrument: &str,
    bars: &[PriceBar],
    config: &CrossoverConfig,
) -> Result<BacktestResult, RankfolioError> {
    config.validate()?;
    if bars.len() < config.slow {
        return Err(RankfolioError::insufficient(
            format!("{instrument} bars for slow SMA"),
            bars.len(),
            config.slow,
        ));
    }

    let fast = calculate_sma(bars, config.fast);
    let slow = calculate_sma(bars, config.slow);
    let last = bars.len() - 1;

    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut stop_price = 0.0;
    let mut weight_history: Vec<HashMap<String, f64>> = Vec::with_capacity(bars.len());
    let mut return_history: Vec<HashMap<String, f64>> = Vec::with_capacity(bars.len());
    let mut weight_in_force = 0.0;

    for (t, bar) in bars.iter().enumerate() {
        if t > 0 {
            let prev_close = bars[t - 1].close;
            let ret = if prev_close > 0.0 { bar.close / prev_close - 1.0 } else { 0.0 };
            weight_history.push(HashMap::from([(instrument.to_string(), weight_in_force)]));
            return_history.push(HashMap::from([(instrument.to_string(), ret)]));
        }

        let long = portfolio.has_holding(instrument);
        if t >= config.slow {
            if long {
                let below_slow = slow.value_at(t).is_some_and(|s| bar.close < s);
                if bar.close < stop_price || below_slow {
                    tracing::debug!(date = %bar.date, close = bar.close, stop_price, "exit");
                    portfolio.sell_all(instrument, bar.close, bar.date, &config.cost);
                }
            } else if t < last && crossed_above(&fast, &slow, t) {
                let budget = portfolio.cash;
                if let Some(trade) =
                    portfolio.buy(instrument, bar.close, budget, bar.date, &config.cost)
                {
                    stop_price = trade.price * (1.0 - config.stop_pct);
                    tracing::debug!(date = %bar.date, price = trade.price, stop_price, "entry");
                }
            }
        }

        if t == last && portfolio.has_holding(instrument) {
            portfolio.sell_all(instrument, bar.close, bar.date, &config.cost);
        }

        let equity = portfolio.total_equity(|_| Some(bar.close));
        portfolio.record_equity(bar.date, equity);
        weight_in_force = portfolio
            .get_holding(instrument)
            .map(|h| if equity > 0.0 { h.market_value(bar.close) / equity } else { 0.0 })
            .unwrap_or(0.0);
    }

    let metrics = Metrics::from_curve(&portfolio.equity_curve, config.risk_free_rate);
    let attribution: BTreeMap<String, f64> =
        metrics::attribution(&weight_history, &return_history);

    Ok(BacktestResult {
        metrics,
        equity_curve: portfolio.equity_curve,
        trades: portfolio.trades,
        attribution,
    })
}

/// `fast[t] > slow[t]` and `fast[t-1] <= slow[t-1]`, all four valid.
fn crossed_above(
    fast: &super::indicator::IndicatorSeries,
    slow: &super::indicator::IndicatorSeries,
    t: usize,
) -> bool {
    if t == 0 {
        return false;
    }
    match (
        fast.value_at(t),
        slow.value_at(t),
        fast.value_at(t - 1),
        slow.value_at(t - 1),
    ) {
        (Some(f), Some(s), Some(pf), Some(ps)) => f > s && pf <= ps,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::TradeSide;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::new(start + chrono::Duration::days(i as i64), c, 10_000))
            .collect()
    }

    fn small_config() -> CrossoverConfig {
        CrossoverConfig {
            fast: 3,
            slow: 6,
            cost: CostModel::frictionless(),
            ..Default::default()
        }
    }

    #[test]
    fn default_periods() {
        let cfg = CrossoverConfig::default();
        assert_eq!(cfg.fast, 20);
        assert_eq!(cfg.slow, 60);
        assert!((cfg.stop_pct - 0.08).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rising_series_never_trades() {
        let closes: Vec<f64> = (0..200).map(|i| 50.0 + i as f64).collect();
        let result = run_crossover("X", &bars(&closes), &CrossoverConfig::default()).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), 200);
        assert!((result.final_equity().unwrap() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn too_few_bars_is_insufficient_data() {
        let closes = vec![10.0; 59];
        let err = run_crossover("X", &bars(&closes), &CrossoverConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RankfolioError::InsufficientData { have: 59, need: 60, .. }
        ));
    }

    #[test]
    fn fast_not_below_slow_is_invalid() {
        let cfg = CrossoverConfig {
            fast: 60,
            slow: 60,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn v_shape_enters_and_is_flattened_at_end() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..=10).map(|i| 91.0 + 2.0 * i as f64));
        let result = run_crossover("X", &bars(&closes), &small_config()).unwrap();

        let sides: Vec<TradeSide> = result.trades.iter().map(|t| t.side).collect();
        assert_eq!(sides, vec![TradeSide::Buy, TradeSide::Sell]);
        assert_eq!(result.trades[1].date, result.equity_curve.last().unwrap().date);
        assert!(result.final_equity().unwrap() > 100.0);
        assert_eq!(result.equity_curve.len(), closes.len());
    }

    #[test]
    fn crash_after_entry_triggers_exit() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..=6).map(|i| 91.0 + 2.0 * i as f64));
        closes.extend([80.0, 80.0, 80.0, 80.0]);
        let result = run_crossover("X", &bars(&closes), &small_config()).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[1].side, TradeSide::Sell);
        // Sold on the crash bar, not forced at the end.
        assert_eq!(result.trades[1].date, bars(&closes)[16].date);
        assert!(result.max_drawdown() < 0.0);
    }

    #[test]
    fn warm_up_equity_is_initial_capital() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..=10).map(|i| 91.0 + 2.0 * i as f64));
        let result = run_crossover("X", &bars(&closes), &small_config()).unwrap();
        assert!(result.equity_curve[..6]
            .iter()
            .all(|p| (p.equity - 100.0).abs() < 1e-12));
    }

    #[test]
    fn costs_applied_on_round_trip() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        closes.extend(vec![91.0; 2]);
        closes.extend((1..=8).map(|i| 91.0 + 2.0 * i as f64));
        closes.push(closes[closes.len() - 1]);
        let with_costs = CrossoverConfig {
            cost: CostModel::default(),
            ..small_config()
        };
        let free = run_crossover("X", &bars(&closes), &small_config()).unwrap();
        let paid = run_crossover("X", &bars(&closes), &with_costs).unwrap();
        assert!(paid.final_equity().unwrap() < free.final_equity().unwrap());
    }
}
