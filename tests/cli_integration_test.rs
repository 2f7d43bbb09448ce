//! CLI integration tests.
//!
//! Tests cover:
//! - Config parsing into engine settings (build_* helpers)
//! - The CSV data adapter wired from `[backtest]` paths
//! - Every subcommand run against INI and CSV files on disk

mod common;

use common::*;
use rankfolio::adapters::file_config_adapter::FileConfigAdapter;
use rankfolio::cli::{self, Cli, Command};
use rankfolio::domain::allocation::Weighting;
use rankfolio::domain::error::RankfolioError;
use rankfolio::ports::data_port::DataPort;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn is_success(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}

fn same_code(code: ExitCode, expected: u8) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::from(expected))
}

/// Two instruments over 800 days with AAA always ranked first.
fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let n = 800;
    write_price_csv(dir.path(), "AAA", &geometric_closes(10.0, 0.001, n));
    write_price_csv(dir.path(), "BBB", &geometric_closes(20.0, -0.0005, n));
    let dates: Vec<_> = (0..n).map(day).collect();
    write_rankings_csv(
        &dir.path().join("rankings.csv"),
        &constant_rankings(&dates, &[("AAA", 2.0), ("BBB", 1.0)]),
    );
    dir
}

fn ini_for(dir: &Path, extra: &str) -> String {
    format!(
        "[backtest]\n\
         initial_capital = 100\n\
         rebalance_interval = 20\n\
         data_dir = {}\n\
         rankings = {}\n\
         [costs]\n\
         brokerage_rate = 0.001425\n\
         tax_rate = 0.003\n\
         slippage_rate = 0.0005\n\
         [selection]\n\
         mode = top_n\n\
         top_n = 1\n\
         [allocation]\n\
         mode = equal\n\
         {extra}",
        dir.display(),
        dir.join("rankings.csv").display()
    )
}

mod config_building {
    use super::*;

    #[test]
    fn backtest_config_reads_every_section() {
        let cfg = FileConfigAdapter::from_string(
            "[backtest]\n\
             initial_capital = 250\n\
             rebalance_interval = 5\n\
             start_date = 2021-01-04\n\
             end_date = 2021-12-31\n\
             risk_free_rate = 0.02\n\
             [costs]\n\
             brokerage_rate = 0.001\n\
             tax_rate = 0.002\n\
             slippage_rate = 0.0\n\
             [allocation]\n\
             mode = risk_parity\n\
             lookback = 30\n\
             [liquidity]\n\
             enabled = true\n\
             max_adtv_fraction = 0.05\n",
        )
        .unwrap();

        let bt = cli::build_backtest_config(&cfg).unwrap();

        assert_eq!(bt.initial_capital, 250.0);
        assert_eq!(bt.rebalance_interval, 5);
        assert_eq!(bt.start_date, Some(date("2021-01-04")));
        assert_eq!(bt.end_date, Some(date("2021-12-31")));
        assert_eq!(bt.risk_free_rate, 0.02);
        assert_eq!(bt.cost.brokerage_rate(), 0.001);
        assert_eq!(bt.cost.tax_rate(), 0.002);
        assert_eq!(bt.weighting, Weighting::RiskParity { lookback: 30 });
        let liq = bt.liquidity.unwrap();
        assert_eq!(liq.max_adtv_fraction, 0.05);
        assert_eq!(liq.lookback, 20);
    }

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let cfg = FileConfigAdapter::from_string("[backtest]\ndata_dir = x\n").unwrap();
        let bt = cli::build_backtest_config(&cfg).unwrap();

        assert_eq!(bt.initial_capital, 100.0);
        assert_eq!(bt.rebalance_interval, 20);
        assert_eq!(bt.weighting, Weighting::Equal);
        assert!(bt.liquidity.is_none());
        assert_eq!(cli::build_strategy(&cfg).unwrap().name(), "top_n");
    }

    #[test]
    fn strategy_modes() {
        for (body, name) in [
            ("mode = top_n\ntop_n = 3\n", "top_n"),
            ("mode = threshold\nthreshold = 0.5\nmax_holdings = 4\n", "threshold"),
            ("mode = sector_rotation\nsectors = 2\nper_sector = 1\n", "sector_rotation"),
        ] {
            let cfg = FileConfigAdapter::from_string(&format!("[selection]\n{body}")).unwrap();
            assert_eq!(cli::build_strategy(&cfg).unwrap().name(), name);
        }
    }

    #[test]
    fn threshold_without_value_is_missing_key() {
        let cfg = FileConfigAdapter::from_string("[selection]\nmode = threshold\n").unwrap();
        let err = cli::build_strategy(&cfg).err().unwrap();
        assert!(matches!(err, RankfolioError::ConfigMissing { ref key, .. } if key == "threshold"));
    }

    #[test]
    fn negative_interval_is_invalid() {
        let cfg = FileConfigAdapter::from_string("[backtest]\nrebalance_interval = -3\n").unwrap();
        let err = cli::build_backtest_config(&cfg).unwrap_err();
        assert!(matches!(err, RankfolioError::InvalidConfiguration { .. }));
    }

    #[test]
    fn walk_forward_anchor_falls_back_to_prices() {
        let cfg = FileConfigAdapter::from_string("[walkforward]\nstep_months = 3\n").unwrap();
        let wf = cli::build_walk_forward_config(&cfg, Some(date("2019-05-01"))).unwrap();
        assert_eq!(wf.start, date("2019-05-01"));
        assert_eq!(wf.window_years, 1);
        assert_eq!(wf.step_months, 3);

        let err = cli::build_walk_forward_config(&cfg, None).unwrap_err();
        assert!(matches!(err, RankfolioError::ConfigMissing { .. }));
    }

    #[test]
    fn walk_forward_prefers_explicit_anchor() {
        let cfg = FileConfigAdapter::from_string(
            "[backtest]\nstart_date = 2018-01-01\n[walkforward]\nstart_date = 2018-06-01\n",
        )
        .unwrap();
        let wf = cli::build_walk_forward_config(&cfg, Some(date("2017-01-01"))).unwrap();
        assert_eq!(wf.start, date("2018-06-01"));
    }

    #[test]
    fn bootstrap_and_crossover_settings() {
        let cfg = FileConfigAdapter::from_string(
            "[bootstrap]\nresamples = 250\nseed = 42\n[single]\nfast = 5\nslow = 15\nstop_pct = 0.1\n",
        )
        .unwrap();

        let bs = cli::build_bootstrap_config(&cfg).unwrap();
        assert_eq!(bs.resamples, 250);
        assert_eq!(bs.seed, Some(42));

        let cx = cli::build_crossover_config(&cfg).unwrap();
        assert_eq!((cx.fast, cx.slow), (5, 15));
        assert_eq!(cx.stop_pct, 0.1);
    }

    #[test]
    fn unseeded_bootstrap_uses_entropy() {
        let cfg = FileConfigAdapter::from_string("[bootstrap]\nresamples = 10\n").unwrap();
        assert_eq!(cli::build_bootstrap_config(&cfg).unwrap().seed, None);
    }
}

mod data_adapter {
    use super::*;

    #[test]
    fn data_dir_and_rankings_come_from_backtest_section() {
        let dir = data_dir();
        let cfg = FileConfigAdapter::from_string(&ini_for(dir.path(), "")).unwrap();

        let csv = cli::build_data_adapter(&cfg).unwrap();

        assert_eq!(csv.list_instruments().unwrap(), vec!["AAA", "BBB"]);
        let rows = csv.fetch_rankings(day(0), day(0)).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn universe_loads_every_listed_instrument() {
        let dir = data_dir();
        let cfg = FileConfigAdapter::from_string(&ini_for(dir.path(), "")).unwrap();
        let csv = cli::build_data_adapter(&cfg).unwrap();

        let universe = cli::load_universe(&csv, day(0), day(9)).unwrap();

        assert_eq!(universe.len(), 2);
        assert_eq!(universe.min_date(), Some(day(0)));
        assert_eq!(universe.max_date(), Some(day(9)));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_accepts_good_config() {
        let dir = data_dir();
        let ini = write_temp_ini(&ini_for(dir.path(), ""));
        let code = cli::run(Cli {
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(is_success(code));
    }

    #[test]
    fn validate_rejects_bad_config_with_config_exit_code() {
        let dir = data_dir();
        let ini = write_temp_ini(&ini_for(dir.path(), "[walkforward]\nstep_months = 0\n"));
        let code = cli::run(Cli {
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(same_code(code, 2));
    }

    #[test]
    fn missing_config_file_fails() {
        let code = cli::run(Cli {
            command: Command::Validate {
                config: "/nonexistent/rankfolio.ini".into(),
            },
        });
        assert!(same_code(code, 2));
    }

    #[test]
    fn backtest_writes_equity_and_trades() {
        let dir = data_dir();
        let out = TempDir::new().unwrap();
        let equity = out.path().join("equity.csv");
        let trades = out.path().join("trades.csv");
        let ini = write_temp_ini(&ini_for(dir.path(), ""));

        let code = cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                equity: Some(equity.clone()),
                trades: Some(trades.clone()),
            },
        });

        assert!(is_success(code));
        let equity_text = std::fs::read_to_string(&equity).unwrap();
        assert!(equity_text.starts_with("date,equity\n2020-01-01,100"));
        assert_eq!(equity_text.lines().count(), 801);
        let trades_text = std::fs::read_to_string(&trades).unwrap();
        assert!(trades_text.starts_with("date,instrument,side,price,shares,value\n"));
        assert!(trades_text.contains(",AAA,buy,"));
        assert!(!trades_text.contains(",BBB,"));
    }

    #[test]
    fn walk_forward_writes_one_row_per_window() {
        let dir = data_dir();
        let out = TempDir::new().unwrap();
        let report = out.path().join("wf.csv");
        let ini = write_temp_ini(&ini_for(
            dir.path(),
            "[walkforward]\nwindow_years = 1\nstep_months = 6\n",
        ));

        let code = cli::run(Cli {
            command: Command::WalkForward {
                config: ini.path().to_path_buf(),
                output: report.clone(),
            },
        });

        assert!(is_success(code));
        let text = std::fs::read_to_string(&report).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "window_start,window_end,cagr,sharpe,max_drawdown");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("2020-01-01,2020-12-31,"));
        assert!(lines[3].starts_with("2021-01-01,2021-12-31,"));
    }

    #[test]
    fn bootstrap_and_crossover_succeed() {
        let dir = data_dir();
        let ini = write_temp_ini(&ini_for(
            dir.path(),
            "[bootstrap]\nresamples = 100\nseed = 11\n[single]\nfast = 10\nslow = 30\n",
        ));

        let code = cli::run(Cli {
            command: Command::Bootstrap {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(is_success(code));

        let code = cli::run(Cli {
            command: Command::Crossover {
                config: ini.path().to_path_buf(),
                instrument: "AAA".to_string(),
                equity: None,
                trades: None,
            },
        });
        assert!(is_success(code));
    }

    #[test]
    fn unknown_instrument_is_data_error() {
        let dir = data_dir();
        let ini = write_temp_ini(&ini_for(dir.path(), ""));
        let code = cli::run(Cli {
            command: Command::Crossover {
                config: ini.path().to_path_buf(),
                instrument: "ZZZ".to_string(),
                equity: None,
                trades: None,
            },
        });
        assert!(same_code(code, 3));
    }
}
