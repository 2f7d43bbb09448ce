//! CLI definition and dispatch.
//!
//! Every subcommand follows the same pipeline: load the INI file, validate
//! it, load prices and rankings through a [`DataPort`], run the engine and
//! print a summary to stderr. CSV output goes to the paths given on the
//! command line.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::allocation::{AllocationStrategy, SectorRotation, Threshold, TopN, Weighting};
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::bootstrap::{bootstrap_pnl, BootstrapConfig, DrawdownInterval};
use crate::domain::config_validation::{require, validate_config};
use crate::domain::cost::{CostModel, DEFAULT_BROKERAGE_RATE, DEFAULT_SLIPPAGE_RATE, DEFAULT_TAX_RATE};
use crate::domain::error::RankfolioError;
use crate::domain::liquidity::LiquidityConfig;
use crate::domain::price_series::{PriceSeries, PriceUniverse};
use crate::domain::ranking::RankingSeries;
use crate::domain::single_asset::{run_crossover, CrossoverConfig};
use crate::domain::walkforward::{
    run_walk_forward, WalkForwardConfig, WalkForwardReport, DEFAULT_STEP_MONTHS, DEFAULT_WINDOW_YEARS,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "rankfolio", about = "Ranking-signal portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the rebalanced multi-asset backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the equity curve as CSV
        #[arg(long)]
        equity: Option<PathBuf>,
        /// Write the trade log as CSV
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Run the moving-average crossover on one instrument
    Crossover {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        equity: Option<PathBuf>,
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Backtest rolling windows and write one CSV row per window
    WalkForward {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Bootstrap a confidence interval for the backtest's maximum drawdown
    Bootstrap {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            equity,
            trades,
        } => run_backtest(&config, equity.as_deref(), trades.as_deref()),
        Command::Crossover {
            config,
            instrument,
            equity,
            trades,
        } => run_crossover_command(&config, &instrument, equity.as_deref(), trades.as_deref()),
        Command::WalkForward { config, output } => run_walk_forward_command(&config, &output),
        Command::Bootstrap { config } => run_bootstrap(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &RankfolioError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Loads and validates the INI file, then builds the CSV data source it names.
fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, CsvAdapter), ExitCode> {
    let adapter = load_config(config_path)?;
    eprintln!("Loaded config from {}", adapter.source());
    validate_config(&adapter).map_err(|e| fail(&e))?;
    let data = build_data_adapter(&adapter).map_err(|e| fail(&e))?;
    Ok((adapter, data))
}

pub fn build_data_adapter(adapter: &dyn ConfigPort) -> Result<CsvAdapter, RankfolioError> {
    let data_dir = require(adapter, "backtest", "data_dir")?;
    let mut csv = CsvAdapter::new(PathBuf::from(data_dir));
    if let Some(rankings) = adapter.get_string("backtest", "rankings") {
        csv = csv.with_rankings(PathBuf::from(rankings.trim()));
    }
    Ok(csv)
}

fn get_usize(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, RankfolioError> {
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| {
        RankfolioError::invalid_config(section, key, format!("{key} must not be negative"))
    })
}

pub fn build_cost_model(adapter: &dyn ConfigPort) -> Result<CostModel, RankfolioError> {
    CostModel::new(
        adapter.get_double("costs", "brokerage_rate", DEFAULT_BROKERAGE_RATE),
        adapter.get_double("costs", "tax_rate", DEFAULT_TAX_RATE),
        adapter.get_double("costs", "slippage_rate", DEFAULT_SLIPPAGE_RATE),
    )
}

pub fn build_weighting(adapter: &dyn ConfigPort) -> Result<Weighting, RankfolioError> {
    let lookback = get_usize(adapter, "allocation", "lookback", 60)?;
    let mode = adapter
        .get_string("allocation", "mode")
        .unwrap_or_else(|| "equal".to_string());
    match mode.trim() {
        "equal" => Ok(Weighting::Equal),
        "cap_weighted" => Ok(Weighting::CapWeighted),
        "risk_parity" => Ok(Weighting::RiskParity { lookback }),
        "mean_variance" => Ok(Weighting::MeanVariance { lookback }),
        other => Err(RankfolioError::invalid_config(
            "allocation",
            "mode",
            format!("unknown allocation mode {other:?}"),
        )),
    }
}

pub fn build_liquidity(adapter: &dyn ConfigPort) -> Result<Option<LiquidityConfig>, RankfolioError> {
    if !adapter.get_bool("liquidity", "enabled", false) {
        return Ok(None);
    }
    let defaults = LiquidityConfig::default();
    Ok(Some(LiquidityConfig {
        lookback: get_usize(adapter, "liquidity", "lookback", defaults.lookback)?,
        max_adtv_fraction: adapter.get_double(
            "liquidity",
            "max_adtv_fraction",
            defaults.max_adtv_fraction,
        ),
        min_adtv: adapter.get_double("liquidity", "min_adtv", defaults.min_adtv),
        min_avg_volume: adapter.get_double("liquidity", "min_avg_volume", defaults.min_avg_volume),
    }))
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RankfolioError> {
    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        rebalance_interval: get_usize(
            adapter,
            "backtest",
            "rebalance_interval",
            defaults.rebalance_interval,
        )?,
        start_date: adapter.get_date("backtest", "start_date"),
        end_date: adapter.get_date("backtest", "end_date"),
        cost: build_cost_model(adapter)?,
        weighting: build_weighting(adapter)?,
        liquidity: build_liquidity(adapter)?,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
    };
    config.validate()?;
    Ok(config)
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Box<dyn AllocationStrategy>, RankfolioError> {
    let mode = adapter
        .get_string("selection", "mode")
        .unwrap_or_else(|| "top_n".to_string());
    match mode.trim() {
        "top_n" => Ok(Box::new(TopN {
            n: get_usize(adapter, "selection", "top_n", 10)?,
        })),
        "threshold" => {
            let raw = require(adapter, "selection", "threshold")?;
            let threshold: f64 = raw.parse().map_err(|_| {
                RankfolioError::invalid_config("selection", "threshold", format!("cannot parse {raw:?}"))
            })?;
            let max_holdings = match adapter.get_string("selection", "max_holdings") {
                Some(_) => Some(get_usize(adapter, "selection", "max_holdings", 0)?),
                None => None,
            };
            Ok(Box::new(Threshold {
                threshold,
                max_holdings,
            }))
        }
        "sector_rotation" => Ok(Box::new(SectorRotation {
            sectors: get_usize(adapter, "selection", "sectors", 3)?,
            per_sector: get_usize(adapter, "selection", "per_sector", 2)?,
        })),
        other => Err(RankfolioError::invalid_config(
            "selection",
            "mode",
            format!("unknown selection mode {other:?}"),
        )),
    }
}

pub fn build_crossover_config(adapter: &dyn ConfigPort) -> Result<CrossoverConfig, RankfolioError> {
    let defaults = CrossoverConfig::default();
    let config = CrossoverConfig {
        fast: get_usize(adapter, "single", "fast", defaults.fast)?,
        slow: get_usize(adapter, "single", "slow", defaults.slow)?,
        stop_pct: adapter.get_double("single", "stop_pct", defaults.stop_pct),
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        cost: build_cost_model(adapter)?,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
    };
    config.validate()?;
    Ok(config)
}

/// The window anchor falls back to `[backtest] start_date`, then to the
/// first available price date.
pub fn build_walk_forward_config(
    adapter: &dyn ConfigPort,
    first_price_date: Option<NaiveDate>,
) -> Result<WalkForwardConfig, RankfolioError> {
    let start = adapter
        .get_date("walkforward", "start_date")
        .or_else(|| adapter.get_date("backtest", "start_date"))
        .or(first_price_date)
        .ok_or_else(|| RankfolioError::ConfigMissing {
            section: "walkforward".to_string(),
            key: "start_date".to_string(),
        })?;
    let window_years = adapter.get_int("walkforward", "window_years", DEFAULT_WINDOW_YEARS.into());
    let step_months = adapter.get_int("walkforward", "step_months", DEFAULT_STEP_MONTHS.into());
    let config = WalkForwardConfig {
        start,
        window_years: u32::try_from(window_years).map_err(|_| {
            RankfolioError::invalid_config("walkforward", "window_years", "must be at least 1")
        })?,
        step_months: u32::try_from(step_months).map_err(|_| {
            RankfolioError::invalid_config("walkforward", "step_months", "must be at least 1")
        })?,
    };
    config.validate()?;
    Ok(config)
}

pub fn build_bootstrap_config(adapter: &dyn ConfigPort) -> Result<BootstrapConfig, RankfolioError> {
    let seed = match adapter.get_string("bootstrap", "seed") {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
            RankfolioError::invalid_config("bootstrap", "seed", format!("cannot parse {raw:?}"))
        })?),
        None => None,
    };
    Ok(BootstrapConfig {
        resamples: get_usize(adapter, "bootstrap", "resamples", BootstrapConfig::default().resamples)?,
        seed,
    })
}

fn data_window(adapter: &dyn ConfigPort) -> (NaiveDate, NaiveDate) {
    (
        adapter
            .get_date("backtest", "start_date")
            .unwrap_or(NaiveDate::MIN),
        adapter.get_date("backtest", "end_date").unwrap_or(NaiveDate::MAX),
    )
}

/// Every instrument the port lists, skipping ones with no bars in range.
pub fn load_universe(
    data: &dyn DataPort,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceUniverse, RankfolioError> {
    let mut universe = PriceUniverse::new();
    for instrument in data.list_instruments()? {
        let bars = data.fetch_prices(&instrument, start, end)?;
        if bars.is_empty() {
            tracing::warn!(%instrument, "no price data in range, skipping");
            continue;
        }
        universe.insert(PriceSeries::new(instrument, bars));
    }
    if universe.is_empty() {
        return Err(RankfolioError::DataLoad {
            reason: "no instruments with price data".to_string(),
        });
    }
    Ok(universe)
}

pub fn load_rankings(
    data: &dyn DataPort,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RankingSeries, RankfolioError> {
    RankingSeries::new(data.fetch_rankings(start, end)?)
}

pub fn run_backtest_pipeline(
    adapter: &dyn ConfigPort,
    data: &dyn DataPort,
) -> Result<BacktestResult, RankfolioError> {
    let bt_config = build_backtest_config(adapter)?;
    let strategy = build_strategy(adapter)?;
    let (start, end) = data_window(adapter);

    let prices = load_universe(data, start, end)?;
    let rankings = load_rankings(data, start, end)?;
    eprintln!(
        "Loaded {} instruments, {} ranking dates",
        prices.len(),
        rankings.len()
    );
    eprintln!(
        "Running {} selection with {} weighting",
        strategy.name(),
        bt_config.weighting.name()
    );

    backtest_engine::run_backtest(&prices, &rankings, strategy.as_ref(), &bt_config)
}

pub fn run_crossover_pipeline(
    adapter: &dyn ConfigPort,
    data: &dyn DataPort,
    instrument: &str,
) -> Result<BacktestResult, RankfolioError> {
    let config = build_crossover_config(adapter)?;
    let (start, end) = data_window(adapter);
    let bars = data.fetch_prices(instrument, start, end)?;
    eprintln!("Loaded {} bars for {instrument}", bars.len());
    run_crossover(instrument, &bars, &config)
}

pub fn run_walk_forward_pipeline(
    adapter: &dyn ConfigPort,
    data: &dyn DataPort,
) -> Result<WalkForwardReport, RankfolioError> {
    let bt_config = build_backtest_config(adapter)?;
    let strategy = build_strategy(adapter)?;
    let (start, end) = data_window(adapter);

    let prices = load_universe(data, start, end)?;
    let rankings = load_rankings(data, start, end)?;
    let wf_config = build_walk_forward_config(adapter, prices.min_date())?;
    eprintln!(
        "Walk-forward from {}: {}y windows, {}m step",
        wf_config.start, wf_config.window_years, wf_config.step_months
    );

    run_walk_forward(&prices, &rankings, strategy.as_ref(), &bt_config, &wf_config)
}

pub fn run_bootstrap_pipeline(
    adapter: &dyn ConfigPort,
    data: &dyn DataPort,
) -> Result<(BacktestResult, DrawdownInterval), RankfolioError> {
    let bs_config = build_bootstrap_config(adapter)?;
    let result = run_backtest_pipeline(adapter, data)?;
    let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
    let interval = bootstrap_pnl(&equity, &bs_config)?;
    Ok((result, interval))
}

fn print_summary(title: &str, result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== {title} ===");
    eprintln!("Total Return:      {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized Return: {:.2}%", m.annualized_return * 100.0);
    eprintln!("Volatility:        {:.2}%", m.annualized_volatility * 100.0);
    eprintln!("Sharpe Ratio:      {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:     {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:      {:.1}%", m.max_drawdown * 100.0);
    eprintln!("Drawdown Length:   {} days", m.max_drawdown_duration);
    eprintln!("Trades:            {}", result.trades.len());

    if !result.attribution.is_empty() {
        eprintln!("\n=== Attribution ===");
        for (instrument, contribution) in &result.attribution {
            eprintln!("  {instrument:<10} {:>8.2}%", contribution * 100.0);
        }
    }
}

fn write_outputs(
    result: &BacktestResult,
    equity: Option<&Path>,
    trades: Option<&Path>,
) -> Result<(), RankfolioError> {
    let report = CsvReportAdapter::new();
    if let Some(path) = equity {
        report.write_equity_curve(&result.equity_curve, path)?;
        eprintln!("Equity curve written to: {}", path.display());
    }
    if let Some(path) = trades {
        report.write_trades(&result.trades, path)?;
        eprintln!("Trades written to: {}", path.display());
    }
    Ok(())
}

fn run_backtest(config_path: &Path, equity: Option<&Path>, trades: Option<&Path>) -> ExitCode {
    let (adapter, data) = match prepare(config_path) {
        Ok(v) => v,
        Err(code) => return code,
    };
    match run_backtest_pipeline(&adapter, &data)
        .and_then(|result| write_outputs(&result, equity, trades).map(|_| result))
    {
        Ok(result) => {
            print_summary("Backtest Results", &result);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_crossover_command(
    config_path: &Path,
    instrument: &str,
    equity: Option<&Path>,
    trades: Option<&Path>,
) -> ExitCode {
    let (adapter, data) = match prepare(config_path) {
        Ok(v) => v,
        Err(code) => return code,
    };
    match run_crossover_pipeline(&adapter, &data, instrument)
        .and_then(|result| write_outputs(&result, equity, trades).map(|_| result))
    {
        Ok(result) => {
            print_summary(&format!("Crossover {instrument}"), &result);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_walk_forward_command(config_path: &Path, output: &Path) -> ExitCode {
    let (adapter, data) = match prepare(config_path) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let report = match run_walk_forward_pipeline(&adapter, &data) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let rows = report.rows();
    eprintln!("\n=== Walk-Forward ({} windows) ===", rows.len());
    for row in &rows {
        eprintln!(
            "  {} .. {}  CAGR {:>7.2}%  Sharpe {:>5.2}  MaxDD {:>6.1}%",
            row.window_start,
            row.window_end,
            row.cagr * 100.0,
            row.sharpe,
            row.max_drawdown * 100.0
        );
    }

    match CsvReportAdapter::new().write_walk_forward(&rows, report.expected_windows, output) {
        Ok(()) => {
            eprintln!("\nReport written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_bootstrap(config_path: &Path) -> ExitCode {
    let (adapter, data) = match prepare(config_path) {
        Ok(v) => v,
        Err(code) => return code,
    };
    match run_bootstrap_pipeline(&adapter, &data) {
        Ok((result, interval)) => {
            print_summary("Backtest Results", &result);
            eprintln!("\n=== Max Drawdown 95% CI ===");
            eprintln!("Observed: {:.1}%", interval.observed * 100.0);
            eprintln!(
                "Interval: [{:.1}%, {:.1}%]",
                interval.ci95_low * 100.0,
                interval.ci95_high * 100.0
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let checked = validate_config(&adapter)
        .and_then(|_| build_backtest_config(&adapter))
        .and_then(|bt| build_strategy(&adapter).map(|s| (bt, s)));
    match checked {
        Ok((bt, strategy)) => {
            eprintln!("  selection:  {}", strategy.name());
            eprintln!("  weighting:  {}", bt.weighting.name());
            eprintln!("  rebalance:  every {} trading days", bt.rebalance_interval);
            eprintln!(
                "  liquidity:  {}",
                if bt.liquidity.is_some() { "on" } else { "off" }
            );
            eprintln!("\nConfig validated successfully");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
