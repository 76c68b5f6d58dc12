//! CLI integration tests for the replay command orchestration.
//!
//! Tests cover:
//! - Settings loading from real INI files on disk
//! - Tick path resolution (flag vs config)
//! - Full replay with CSV output
//! - Clap argument parsing and exit codes

mod common;

use clap::Parser;
use common::*;
use indigraph::adapters::csv_adapter::{CsvCandleHistory, CsvTickAdapter};
use indigraph::cli::{self, Cli, Command};
use indigraph::domain::error::GraphError;
use indigraph::domain::indicator::PriceKind;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const VALID_INI: &str = r#"
[graph]
max_hops = 50
cache_initial_slots = 64
cache_max_slots = 1024
cache_max_conflicts = 8
history_max_size = 500

[feed]
symbol = EURUSD

[candles]
width_ms = 60000

[indicator]
applied_price = close
sma_period = 2
"#;

/// Exit codes compared through their debug form.
fn code(c: ExitCode) -> String {
    format!("{:?}", c)
}

const TICKS_CSV: &str = "timestamp_ms,bid,ask,volume\n\
    1000,1.2000,1.2002,1\n\
    30000,1.2050,1.2052,1\n\
    59999,1.1990,1.1992,2\n\
    60001,1.2010,1.2012,1\n";

mod config_loading {
    use super::*;

    #[test]
    fn load_settings_from_file() {
        let file = write_temp(VALID_INI);
        let settings = cli::load_settings(file.path()).unwrap();
        assert_eq!(settings.candle_width_ms, 60_000);
        assert_eq!(settings.applied_price, PriceKind::Close);
        assert_eq!(settings.sma_period, 2);
        assert_eq!(settings.history_max_size, 500);
        assert_eq!(settings.node.cache.initial_slots, 64);
        assert_eq!(settings.symbol.as_deref(), Some("EURUSD"));
    }

    #[test]
    fn load_settings_missing_file() {
        let err = cli::load_settings(Path::new("/nonexistent/indigraph.ini")).unwrap_err();
        assert!(matches!(err, GraphError::ConfigParse { .. }));
        assert_eq!(code(ExitCode::from(&err)), code(ExitCode::from(2)));
    }

    #[test]
    fn load_settings_rejects_invalid_values() {
        let file = write_temp("[candles]\nwidth_ms = -5\n");
        let err = cli::load_settings(file.path()).unwrap_err();
        assert!(matches!(err, GraphError::ConfigInvalid { .. }));
    }
}

mod tick_path {
    use super::*;

    #[test]
    fn flag_overrides_config() {
        let file = write_temp("[candles]\nwidth_ms = 1000\n[feed]\nticks = from_config.csv\n");
        let settings = cli::load_settings(file.path()).unwrap();
        assert_eq!(
            cli::resolve_ticks_path(Some(Path::new("flag.csv")), &settings).unwrap(),
            PathBuf::from("flag.csv")
        );
        assert_eq!(
            cli::resolve_ticks_path(None, &settings).unwrap(),
            PathBuf::from("from_config.csv")
        );
    }

    #[test]
    fn missing_tick_source_is_config_error() {
        let file = write_temp("[candles]\nwidth_ms = 1000\n");
        let settings = cli::load_settings(file.path()).unwrap();
        let err = cli::resolve_ticks_path(None, &settings).unwrap_err();
        assert!(matches!(err, GraphError::ConfigMissing { key, .. } if key == "ticks"));
    }
}

mod replay {
    use super::*;

    fn replay_csv(ini: &str, ticks: &str, history: Option<&str>, last: usize) -> (String, usize) {
        let ini_file = write_temp(ini);
        let ticks_file = write_temp(ticks);
        let settings = cli::load_settings(ini_file.path()).unwrap();
        let port = CsvTickAdapter::new(ticks_file.path());

        let history_file = history.map(write_temp);
        let history = history_file.as_ref().map(|f| {
            Box::new(CsvCandleHistory::from_file(f.path()).unwrap())
                as Box<dyn indigraph::ports::candle_history_port::CandleHistoryPort>
        });

        let mut out = Vec::new();
        let stats = cli::run_replay_pipeline(&settings, &port, history, last, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), stats.ticks)
    }

    #[test]
    fn writes_candles_as_csv() {
        let (out, ticks) = replay_csv(VALID_INI, TICKS_CSV, None, 10);
        assert_eq!(ticks, 4);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp_ms,time,open,high,low,close,volume,applied,sma"
        );
        assert_eq!(
            lines[1],
            "0,1970-01-01 00:00:00.000,1.2,1.205,1.199,1.199,4,1.199,"
        );
        assert!(lines[2].starts_with("60000,1970-01-01 00:01:00.000,1.201,1.201,1.201,1.201,1,1.201,"));
        let sma: f64 = lines[2].rsplit(',').next().unwrap().parse().unwrap();
        approx::assert_relative_eq!(sma, 1.2);
    }

    #[test]
    fn last_limits_rows() {
        let (out, _) = replay_csv(VALID_INI, TICKS_CSV, None, 1);
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().nth(1).unwrap().starts_with("60000,"));
    }

    #[test]
    fn history_backfills_output() {
        let history = "timestamp_ms,open,high,low,close,volume\n\
            -60000,1.0,1.1,0.9,1.05,10\n";
        let (out, _) = replay_csv(VALID_INI, TICKS_CSV, Some(history), 3);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("-60000,1969-12-31 23:59:00.000,1,1.1,0.9,1.05,10,1.05,"));
        // Backfilled bar completes the SMA warmup of the first live bar.
        assert!(!lines[2].ends_with(','));
    }

    #[test]
    fn out_of_order_ticks_fail() {
        let ini_file = write_temp(VALID_INI);
        let ticks_file = write_temp("timestamp_ms,bid,ask\n5000,1.0,1.0\n4000,1.0,1.0\n");
        let settings = cli::load_settings(ini_file.path()).unwrap();
        let port = CsvTickAdapter::new(ticks_file.path());
        let mut out = Vec::new();
        let err = cli::run_replay_pipeline(&settings, &port, None, 5, &mut out).unwrap_err();
        assert_eq!(code(ExitCode::from(&err)), code(ExitCode::from(5)));
    }
}

mod arguments {
    use super::*;

    #[test]
    fn parses_replay() {
        let cli = Cli::try_parse_from([
            "indigraph", "replay", "-c", "graph.ini", "--ticks", "t.csv", "--last", "5",
        ])
        .unwrap();
        match cli.command {
            Command::Replay {
                config,
                ticks,
                last,
            } => {
                assert_eq!(config, PathBuf::from("graph.ini"));
                assert_eq!(ticks, Some(PathBuf::from("t.csv")));
                assert_eq!(last, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn replay_defaults() {
        let cli = Cli::try_parse_from(["indigraph", "replay", "--config", "g.ini"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Replay { ticks: None, last: 20, .. }
        ));
    }

    #[test]
    fn validate_requires_config() {
        assert!(Cli::try_parse_from(["indigraph", "validate"]).is_err());
    }

    #[test]
    fn validate_command_exit_codes() {
        let good = write_temp(VALID_INI);
        let cli = Cli::try_parse_from(["indigraph", "validate", "-c", good.path().to_str().unwrap()]).unwrap();
        assert_eq!(code(cli::run(cli)), code(ExitCode::SUCCESS));

        let bad = write_temp("[indicator]\napplied_price = vwap\n[candles]\nwidth_ms = 1000\n");
        let cli = Cli::try_parse_from(["indigraph", "validate", "-c", bad.path().to_str().unwrap()]).unwrap();
        assert_eq!(code(cli::run(cli)), code(ExitCode::from(2)));
    }

    #[test]
    fn info_reads_tick_file() {
        let ticks = write_temp(TICKS_CSV);
        let cli = Cli::try_parse_from(["indigraph", "info", "--ticks", ticks.path().to_str().unwrap()]).unwrap();
        assert_eq!(code(cli::run(cli)), code(ExitCode::SUCCESS));

        let cli = Cli::try_parse_from(["indigraph", "info", "--ticks", "/nonexistent/ticks.csv"]).unwrap();
        assert_eq!(code(cli::run(cli)), code(ExitCode::from(1)));
    }

    #[test]
    fn formats_timestamps_in_utc() {
        assert_eq!(cli::format_ms(0), "1970-01-01 00:00:00.000");
        assert_eq!(cli::format_ms(1_700_000_000_123), "2023-11-14 22:13:20.123");
    }
}
