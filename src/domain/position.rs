//! Holdings and the append-only trade record.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// A long position. Share counts are fractional.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub instrument: String,
    pub shares: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
}

impl Holding {
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares * (price - self.entry_price)
    }
}

/// One executed fill. `price` is the slippage-adjusted execution price and
/// `value` the cash that left (buy) or entered (sell) the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub instrument: String,
    pub side: TradeSide,
    pub price: f64,
    pub shares: f64,
    pub value: f64,
}
