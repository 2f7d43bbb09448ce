//! Portfolio state and equity tracking.
//!
//! The portfolio is owned by a single simulation run. Trades are the only
//! record of position changes, and cash never goes negative.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::cost::CostModel;
use super::position::{Holding, Trade, TradeSide};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            holdings: BTreeMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn get_holding(&self, instrument: &str) -> Option<&Holding> {
        self.holdings.get(instrument)
    }

    pub fn has_holding(&self, instrument: &str) -> bool {
        self.holdings.contains_key(instrument)
    }

    pub fn holding_count(&self) -> usize {
        self.holdings.len()
    }

    /// Spends up to `budget` of cash buying `instrument` at `market_price`.
    ///
    /// The budget covers slippage and brokerage, so cash falls by exactly the
    /// amount spent. Adds to an existing holding at a blended entry price.
    /// Returns `None` when nothing could be bought.
    pub fn buy(
        &mut self,
        instrument: &str,
        market_price: f64,
        budget: f64,
        date: NaiveDate,
        cost: &CostModel,
    ) -> Option<Trade> {
        let budget = budget.min(self.cash);
        if budget <= 0.0 || market_price <= 0.0 || !market_price.is_finite() {
            return None;
        }

        let notional = cost.affordable_notional(budget);
        let shares = notional / market_price;
        let spent = cost.apply(notional, TradeSide::Buy);
        let execution_price = cost.execution_price(market_price, TradeSide::Buy);

        self.cash = (self.cash - spent).max(0.0);

        self.holdings
            .entry(instrument.to_string())
            .and_modify(|h| {
                let total = h.shares + shares;
                h.entry_price = (h.shares * h.entry_price + shares * execution_price) / total;
                h.shares = total;
            })
            .or_insert_with(|| Holding {
                instrument: instrument.to_string(),
                shares,
                entry_price: execution_price,
                entry_date: date,
            });

        let trade = Trade {
            date,
            instrument: instrument.to_string(),
            side: TradeSide::Buy,
            price: execution_price,
            shares,
            value: spent,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Liquidates the whole holding at `market_price`, net of costs.
    pub fn sell_all(
        &mut self,
        instrument: &str,
        market_price: f64,
        date: NaiveDate,
        cost: &CostModel,
    ) -> Option<Trade> {
        let holding = self.holdings.remove(instrument)?;

        let proceeds = cost.apply(holding.shares * market_price, TradeSide::Sell);
        self.cash += proceeds;

        let trade = Trade {
            date,
            instrument: holding.instrument,
            side: TradeSide::Sell,
            price: cost.execution_price(market_price, TradeSide::Sell),
            shares: holding.shares,
            value: proceeds,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    /// Cash plus holdings marked at `price_of`. A holding with no price is
    /// carried at its entry price.
    pub fn total_equity<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        let position_value: f64 = self
            .holdings
            .values()
            .map(|h| h.market_value(price_of(h.instrument.as_str()).unwrap_or(h.entry_price)))
            .sum();
        self.cash + position_value
    }

    /// Each holding's share of total equity.
    pub fn weights<F>(&self, price_of: F) -> HashMap<String, f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let equity = self.total_equity(&price_of);
        if equity <= 0.0 {
            return HashMap::new();
        }
        self.holdings
            .values()
            .map(|h| {
                let price = price_of(h.instrument.as_str()).unwrap_or(h.entry_price);
                (h.instrument.clone(), h.market_value(price) / equity)
            })
            .collect()
    }
}
