//! Trading frictions: brokerage, transaction tax and slippage.
//!
//! Every rate is a fraction of notional. Brokerage and slippage hit both
//! legs; transaction tax is levied on sells only.

use crate::domain::error::RankfolioError;
use crate::domain::position::TradeSide;

pub const DEFAULT_BROKERAGE_RATE: f64 = 0.001425;
pub const DEFAULT_TAX_RATE: f64 = 0.003;
pub const DEFAULT_SLIPPAGE_RATE: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    brokerage_rate: f64,
    tax_rate: f64,
    slippage_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            brokerage_rate: DEFAULT_BROKERAGE_RATE,
            tax_rate: DEFAULT_TAX_RATE,
            slippage_rate: DEFAULT_SLIPPAGE_RATE,
        }
    }
}

impl CostModel {
    pub fn new(brokerage_rate: f64, tax_rate: f64, slippage_rate: f64) -> Result<Self, RankfolioError> {
        for (key, value) in [
            ("brokerage_rate", brokerage_rate),
            ("tax_rate", tax_rate),
            ("slippage_rate", slippage_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RankfolioError::invalid_config(
                    "costs",
                    key,
                    format!("{key} must be a non-negative fraction, got {value}"),
                ));
            }
            if value >= 1.0 {
                return Err(RankfolioError::invalid_config(
                    "costs",
                    key,
                    format!("{key} must be below 1, got {value}"),
                ));
            }
        }
        Ok(CostModel {
            brokerage_rate,
            tax_rate,
            slippage_rate,
        })
    }

    /// No frictions at all.
    pub fn frictionless() -> Self {
        CostModel {
            brokerage_rate: 0.0,
            tax_rate: 0.0,
            slippage_rate: 0.0,
        }
    }

    pub fn brokerage_rate(&self) -> f64 {
        self.brokerage_rate
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn slippage_rate(&self) -> f64 {
        self.slippage_rate
    }

    /// Cash required (buy) or received (sell) for a trade of `notional` at
    /// the quoted close.
    pub fn apply(&self, notional: f64, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => notional * (1.0 + self.slippage_rate) * (1.0 + self.brokerage_rate),
            TradeSide::Sell => {
                notional
                    * (1.0 - self.slippage_rate)
                    * (1.0 - self.brokerage_rate)
                    * (1.0 - self.tax_rate)
            }
        }
    }

    /// Quoted price moved against the trader by the slippage rate.
    pub fn execution_price(&self, market_price: f64, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => market_price * (1.0 + self.slippage_rate),
            TradeSide::Sell => market_price * (1.0 - self.slippage_rate),
        }
    }

    /// Largest notional that `cash` can pay for once buy-side costs are added.
    pub fn affordable_notional(&self, cash: f64) -> f64 {
        cash / self.apply(1.0, TradeSide::Buy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CostModel {
        CostModel::new(0.001425, 0.003, 0.0005).unwrap()
    }

    #[test]
    fn buy_adds_slippage_and_brokerage_only() {
        let cash = model().apply(10_000.0, TradeSide::Buy);
        let expected = 10_000.0 * 1.0005 * 1.001425;
        assert!((cash - expected).abs() < 1e-9);
    }

    #[test]
    fn sell_deducts_slippage_brokerage_and_tax() {
        let proceeds = model().apply(10_000.0, TradeSide::Sell);
        let expected = 10_000.0 * 0.9995 * 0.998575 * 0.997;
        assert!((proceeds - expected).abs() < 1e-9);
    }

    #[test]
    fn frictionless_is_identity() {
        let m = CostModel::frictionless();
        assert_eq!(m.apply(1234.5, TradeSide::Buy), 1234.5);
        assert_eq!(m.apply(1234.5, TradeSide::Sell), 1234.5);
    }

    #[test]
    fn defaults_match_constants() {
        let m = CostModel::default();
        assert_eq!(m.brokerage_rate(), DEFAULT_BROKERAGE_RATE);
        assert_eq!(m.tax_rate(), DEFAULT_TAX_RATE);
        assert_eq!(m.slippage_rate(), DEFAULT_SLIPPAGE_RATE);
    }

    #[test]
    fn negative_rate_is_invalid_configuration() {
        let err = CostModel::new(-0.001, 0.0, 0.0).unwrap_err();
        assert!(matches!(
            err,
            RankfolioError::InvalidConfiguration { ref key, .. } if key == "brokerage_rate"
        ));
        assert!(CostModel::new(0.0, -0.1, 0.0).is_err());
        assert!(CostModel::new(0.0, 0.0, -0.1).is_err());
    }

    #[test]
    fn rate_of_one_or_more_is_rejected() {
        assert!(CostModel::new(0.0, 1.0, 0.0).is_err());
        assert!(CostModel::new(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn execution_price_moves_against_trader() {
        let m = model();
        assert!((m.execution_price(100.0, TradeSide::Buy) - 100.05).abs() < 1e-9);
        assert!((m.execution_price(100.0, TradeSide::Sell) - 99.95).abs() < 1e-9);
    }

    #[test]
    fn affordable_notional_spends_all_cash() {
        let m = model();
        let notional = m.affordable_notional(1_000.0);
        assert!((m.apply(notional, TradeSide::Buy) - 1_000.0).abs() < 1e-9);
    }
}
