//! CLI definition and dispatch.

use chrono::DateTime;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvCandleHistory, CsvTickAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::validate_graph_config;
use crate::domain::error::GraphError;
use crate::domain::pipeline::{CandleRow, GraphSettings, Pipeline, ReplayStats};
use crate::ports::candle_history_port::CandleHistoryPort;
use crate::ports::tick_port::TickPort;

#[derive(Parser, Debug)]
#[command(name = "indigraph", about = "Tick replay through an indicator graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay ticks and print the resulting candles with indicator values
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Tick CSV; overrides [feed] ticks
        #[arg(long)]
        ticks: Option<PathBuf>,
        /// Number of most recent candles to print
        #[arg(long, default_value_t = 20)]
        last: usize,
    },
    /// Validate a graph configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the size and time range of a tick file
    Info {
        #[arg(long)]
        ticks: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Replay {
            config,
            ticks,
            last,
        } => run_replay(&config, ticks.as_deref(), last),
        Command::Validate { config } => run_validate(&config),
        Command::Info { ticks } => run_info(&ticks),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_settings(path: &Path) -> Result<GraphSettings, GraphError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    GraphSettings::from_config(&adapter)
}

/// Resolves the tick file: the CLI flag wins over `[feed] ticks`.
pub fn resolve_ticks_path(
    flag: Option<&Path>,
    settings: &GraphSettings,
) -> Result<PathBuf, GraphError> {
    flag.map(Path::to_path_buf)
        .or_else(|| settings.ticks_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| GraphError::ConfigMissing {
            section: "feed".to_string(),
            key: "ticks".to_string(),
        })
}

/// Builds the pipeline, replays `ticks` through it and writes the newest
/// `last` candles as CSV to `out`.
pub fn run_replay_pipeline(
    settings: &GraphSettings,
    ticks: &dyn TickPort,
    history: Option<Box<dyn CandleHistoryPort>>,
    last: usize,
    out: &mut dyn Write,
) -> Result<ReplayStats, GraphError> {
    let mut pipeline = Pipeline::build(settings, history)?;
    let stats = pipeline.replay(ticks)?;
    write_rows(&pipeline.rows(last), out)?;
    Ok(stats)
}

pub fn write_rows(rows: &[CandleRow], out: &mut dyn Write) -> Result<(), GraphError> {
    let mut wtr = csv::Writer::from_writer(out);
    let csv_err = |e: csv::Error| GraphError::Data {
        reason: format!("CSV write error: {}", e),
    };
    wtr.write_record([
        "timestamp_ms",
        "time",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "applied",
        "sma",
    ])
    .map_err(csv_err)?;

    let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for row in rows {
        wtr.write_record([
            row.timestamp_ms.to_string(),
            format_ms(row.timestamp_ms),
            row.open.to_string(),
            row.high.to_string(),
            row.low.to_string(),
            row.close.to_string(),
            row.volume.to_string(),
            opt(row.applied),
            opt(row.sma),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// UTC rendering of a millisecond timestamp.
pub fn format_ms(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn run_replay(config_path: &Path, ticks_flag: Option<&Path>, last: usize) -> Result<(), GraphError> {
    eprintln!("Loading config from {}", config_path.display());
    let settings = load_settings(config_path)?;
    let ticks_path = resolve_ticks_path(ticks_flag, &settings)?;

    let history: Option<Box<dyn CandleHistoryPort>> = match &settings.history_path {
        Some(p) => Some(Box::new(CsvCandleHistory::from_file(p)?)),
        None => None,
    };

    eprintln!("Replaying ticks from {}", ticks_path.display());
    let port = CsvTickAdapter::new(ticks_path);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = run_replay_pipeline(&settings, &port, history, last, &mut out)?;

    eprintln!(
        "{} ticks, {} candles{}",
        stats.ticks,
        stats.candles,
        settings
            .symbol
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default()
    );
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), GraphError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    eprintln!("Validating config: {}", adapter.source());
    validate_graph_config(&adapter)?;

    let settings = GraphSettings::from_config(&adapter)?;
    // Wiring catches topology errors the per-key checks cannot.
    Pipeline::build(&settings, None)?;

    eprintln!("  candles:       {} ms", settings.candle_width_ms);
    eprintln!("  applied price: {}", settings.applied_price);
    eprintln!("  sma period:    {}", settings.sma_period);
    eprintln!("  max hops:      {}", settings.node.max_hops);
    eprintln!(
        "  cache:         {} → {} slots, {} max conflicts",
        settings.node.cache.initial_slots,
        settings.node.cache.max_slots,
        settings.node.cache.max_conflicts
    );
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_info(ticks_path: &Path) -> Result<(), GraphError> {
    let ticks = CsvTickAdapter::new(ticks_path).fetch_ticks()?;
    match (ticks.first(), ticks.last()) {
        (Some(first), Some(last)) => println!(
            "{}: {} ticks, {} to {}",
            ticks_path.display(),
            ticks.len(),
            format_ms(first.timestamp_ms),
            format_ms(last.timestamp_ms)
        ),
        _ => println!("{}: no ticks", ticks_path.display()),
    }
    Ok(())
}
