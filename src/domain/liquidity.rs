//! Liquidity-aware sizing and universe filtering.
//!
//! The sizer caps each target notional at a fraction of the instrument's
//! average daily traded value (ADTV) and zeroes instruments with no
//! measurable liquidity. The filter drops thinly traded instruments from the
//! candidate list before selection.

use crate::domain::price_series::PriceUniverse;
use crate::domain::ranking::RankRow;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityConfig {
    /// Trailing bars used for ADTV and average volume.
    pub lookback: usize,
    /// Largest position notional as a fraction of ADTV.
    pub max_adtv_fraction: f64,
    /// ADTV below this forces the position to zero.
    pub min_adtv: f64,
    /// Average share volume below this excludes the instrument from selection.
    pub min_avg_volume: f64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        LiquidityConfig {
            lookback: 20,
            max_adtv_fraction: 0.10,
            min_adtv: 0.0,
            min_avg_volume: 0.0,
        }
    }
}

/// Caps one target notional against its ADTV.
pub fn size_position(notional: f64, adtv: f64, config: &LiquidityConfig) -> f64 {
    if adtv <= 0.0 || adtv < config.min_adtv || notional <= 0.0 {
        return 0.0;
    }
    notional.min(adtv * config.max_adtv_fraction)
}

/// Caps every target notional. Instruments missing from `adtv` are treated
/// as having no liquidity.
pub fn size_positions(
    targets: &[(String, f64)],
    adtv: &HashMap<String, f64>,
    config: &LiquidityConfig,
) -> Vec<(String, f64)> {
    targets
        .iter()
        .map(|(instrument, notional)| {
            let instrument_adtv = adtv.get(instrument).copied().unwrap_or(0.0);
            (
                instrument.clone(),
                size_position(*notional, instrument_adtv, config),
            )
        })
        .collect()
}

/// Trailing ADTV for each instrument as of `date`.
pub fn adtv_map<'a>(
    instruments: impl IntoIterator<Item = &'a str>,
    prices: &PriceUniverse,
    date: NaiveDate,
    lookback: usize,
) -> HashMap<String, f64> {
    instruments
        .into_iter()
        .map(|id| {
            let adtv = prices
                .get(id)
                .map(|s| s.adtv(date, lookback))
                .unwrap_or(0.0);
            (id.to_string(), adtv)
        })
        .collect()
}

/// Keeps the ranking rows whose instrument trades at least
/// `min_avg_volume` shares a day over the lookback and has a price series.
pub fn filter_candidates<'a>(
    candidates: &'a [RankRow],
    prices: &PriceUniverse,
    date: NaiveDate,
    config: &LiquidityConfig,
) -> Vec<&'a RankRow> {
    candidates
        .iter()
        .filter(|row| {
            prices
                .get(&row.instrument)
                .map(|s| s.average_volume(date, config.lookback) >= config.min_avg_volume)
                .unwrap_or(false)
        })
        .collect()
}
