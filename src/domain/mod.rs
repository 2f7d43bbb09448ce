//! Core domain types and logic.

pub mod error;
pub mod price;
pub mod price_series;
pub mod ranking;
pub mod indicator;
pub mod cost;
pub mod position;
pub mod portfolio;
pub mod optimizer;
pub mod liquidity;
pub mod allocation;
pub mod metrics;
pub mod backtest;
pub mod single_asset;
pub mod bootstrap;
pub mod walkforward;
pub mod config_validation;
