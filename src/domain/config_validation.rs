//! Configuration validation.
//!
//! Checks every section before any simulation runs. Values are read as raw
//! strings so a malformed number is reported instead of silently replaced
//! by its default.

use crate::domain::error::RankfolioError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub const SELECTION_MODES: [&str; 3] = ["top_n", "threshold", "sector_rotation"];
pub const ALLOCATION_MODES: [&str; 4] = ["equal", "cap_weighted", "risk_parity", "mean_variance"];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    validate_backtest(config)?;
    validate_costs(config)?;
    validate_selection(config)?;
    validate_allocation(config)?;
    validate_liquidity(config)?;
    validate_walk_forward(config)?;
    validate_bootstrap(config)?;
    validate_single(config)?;
    Ok(())
}

/// Fails with `ConfigMissing` unless `[section] key` holds a non-blank value.
pub fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, RankfolioError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(RankfolioError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, RankfolioError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            RankfolioError::invalid_config(section, key, format!("cannot parse {raw:?}"))
        }),
    }
}

fn date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, RankfolioError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RankfolioError::invalid_config(
                    section,
                    key,
                    format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn at_least(config: &dyn ConfigPort, section: &str, key: &str, min: i64) -> Result<(), RankfolioError> {
    if let Some(value) = parsed::<i64>(config, section, key)? {
        if value < min {
            return Err(RankfolioError::invalid_config(
                section,
                key,
                format!("{key} must be at least {min}, got {value}"),
            ));
        }
    }
    Ok(())
}

fn fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allow_zero: bool,
    allow_one: bool,
) -> Result<(), RankfolioError> {
    if let Some(value) = parsed::<f64>(config, section, key)? {
        let low_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
        let high_ok = if allow_one { value <= 1.0 } else { value < 1.0 };
        if !(low_ok && high_ok) {
            return Err(RankfolioError::invalid_config(
                section,
                key,
                format!("{key} out of range, got {value}"),
            ));
        }
    }
    Ok(())
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), RankfolioError> {
    if let Some(value) = parsed::<f64>(config, section, key)? {
        if !(value >= 0.0 && value.is_finite()) {
            return Err(RankfolioError::invalid_config(
                section,
                key,
                format!("{key} must be non-negative, got {value}"),
            ));
        }
    }
    Ok(())
}

fn one_of(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), RankfolioError> {
    if let Some(mode) = config.get_string(section, key) {
        if !allowed.contains(&mode.trim()) {
            return Err(RankfolioError::invalid_config(
                section,
                key,
                format!("unknown {key} {mode:?}, expected one of {}", allowed.join(", ")),
            ));
        }
    }
    Ok(())
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    if let Some(capital) = parsed::<f64>(config, "backtest", "initial_capital")? {
        if !(capital > 0.0 && capital.is_finite()) {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
    }
    at_least(config, "backtest", "rebalance_interval", 1)?;
    fraction(config, "backtest", "risk_free_rate", true, false)?;

    let start = date(config, "backtest", "start_date")?;
    let end = date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(RankfolioError::invalid_config(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    require(config, "backtest", "data_dir")?;
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    for key in ["brokerage_rate", "tax_rate", "slippage_rate"] {
        fraction(config, "costs", key, true, false)?;
    }
    Ok(())
}

fn validate_selection(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    one_of(config, "selection", "mode", &SELECTION_MODES)?;
    at_least(config, "selection", "top_n", 1)?;
    at_least(config, "selection", "max_holdings", 1)?;
    at_least(config, "selection", "sectors", 1)?;
    at_least(config, "selection", "per_sector", 1)?;
    if config.get_string("selection", "mode").as_deref().map(str::trim) == Some("threshold") {
        require(config, "selection", "threshold")?;
    }
    parsed::<f64>(config, "selection", "threshold")?;
    Ok(())
}

fn validate_allocation(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    one_of(config, "allocation", "mode", &ALLOCATION_MODES)?;
    at_least(config, "allocation", "lookback", 2)
}

fn validate_liquidity(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    at_least(config, "liquidity", "lookback", 1)?;
    fraction(config, "liquidity", "max_adtv_fraction", false, true)?;
    non_negative(config, "liquidity", "min_adtv")?;
    non_negative(config, "liquidity", "min_avg_volume")
}

fn validate_walk_forward(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    date(config, "walkforward", "start_date")?;
    at_least(config, "walkforward", "window_years", 1)?;
    at_least(config, "walkforward", "step_months", 1)
}

fn validate_bootstrap(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    at_least(config, "bootstrap", "resamples", 1)?;
    parsed::<u64>(config, "bootstrap", "seed")?;
    Ok(())
}

fn validate_single(config: &dyn ConfigPort) -> Result<(), RankfolioError> {
    at_least(config, "single", "fast", 1)?;
    at_least(config, "single", "slow", 2)?;
    let fast = parsed::<i64>(config, "single", "fast")?.unwrap_or(20);
    let slow = parsed::<i64>(config, "single", "slow")?.unwrap_or(60);
    if fast >= slow {
        return Err(RankfolioError::invalid_config(
            "single",
            "slow",
            format!("slow ({slow}) must exceed fast ({fast})"),
        ));
    }
    fraction(config, "single", "stop_pct", false, false)
}
