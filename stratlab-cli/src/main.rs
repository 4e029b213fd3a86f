//! StratLab CLI — run, batch, inspect, and cache management commands.
//!
//! Commands:
//! - `run`: backtest one strategy file against one symbol
//! - `batch`: backtest one strategy file against many symbols in parallel
//! - `inspect`: print the extracted strategy spec and diagnostics
//! - `cache status`: list cached series with candle counts and age
//! - `cache clear`: remove every cached series

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratlab_core::data::{CacheStore, FileStore};
use stratlab_core::{analyze, Timeframe};
use stratlab_runner::{save_report, Orchestrator, RunConfig, RunReport, RunRequest, SourceKind};

#[derive(Parser)]
#[command(
    name = "stratlab",
    about = "StratLab CLI — backtest freqtrade-style strategy files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    Synthetic,
    Binance,
}

impl From<Source> for SourceKind {
    fn from(source: Source) -> Self {
        match source {
            Source::Synthetic => SourceKind::Synthetic,
            Source::Binance => SourceKind::Binance,
        }
    }
}

/// Flags shared by `run` and `batch`; each one overrides the config file.
#[derive(clap::Args)]
struct RunArgs {
    /// Path to the strategy source file.
    #[arg(long)]
    strategy: PathBuf,

    /// Path to a TOML run config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Months of history to fetch.
    #[arg(long)]
    months: Option<u32>,

    /// Starting balance.
    #[arg(long)]
    balance: Option<f64>,

    /// Candle interval (1m, 5m, 15m, 30m, 1h, 4h, 1d). Defaults to the strategy's own.
    #[arg(long)]
    timeframe: Option<Timeframe>,

    /// Market data source.
    #[arg(long, value_enum)]
    source: Option<Source>,

    /// Cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output directory for report JSON.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Also write trade and equity CSV files.
    #[arg(long, default_value_t = false)]
    csv: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a strategy file against one symbol.
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Trading pair, e.g. BTC/USDT.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backtest a strategy file against several symbols in parallel.
    Batch {
        #[command(flatten)]
        args: RunArgs,

        /// Trading pairs, e.g. BTC/USDT ETH/USDT.
        #[arg(long, required = true, num_args = 1..)]
        symbols: Vec<String>,
    },
    /// Print what the extractor recognises in a strategy file.
    Inspect {
        /// Path to the strategy source file.
        #[arg(long)]
        strategy: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached series with candle count and age.
    Status {
        /// Cache directory.
        #[arg(long, default_value = ".stratlab/cache")]
        cache_dir: PathBuf,
    },
    /// Remove every cached series.
    Clear {
        /// Cache directory.
        #[arg(long, default_value = ".stratlab/cache")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stratlab=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args, symbol } => run_cmd(args, symbol),
        Commands::Batch { args, symbols } => batch_cmd(args, symbols),
        Commands::Inspect { strategy } => inspect_cmd(&strategy),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => cache_status(&cache_dir),
            CacheAction::Clear { cache_dir } => cache_clear(&cache_dir),
        },
    }
}

fn read_strategy(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read strategy file {}", path.display()))
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };

    if let Some(months) = args.months {
        config.backtest.months = months;
    }
    if let Some(balance) = args.balance {
        config.backtest.starting_balance = balance;
    }
    if let Some(timeframe) = args.timeframe {
        config.backtest.timeframe = Some(timeframe);
    }
    if let Some(source) = args.source {
        config.data.source = source.into();
    }
    if let Some(dir) = &args.cache_dir {
        config.data.cache_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_cmd(args: RunArgs, symbol: Option<String>) -> Result<()> {
    let source = read_strategy(&args.strategy)?;
    let mut config = load_config(&args)?;
    if let Some(symbol) = symbol {
        config.backtest.symbol = symbol;
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let request = RunRequest::from(&config.backtest);
    let report = orchestrator
        .run_backtest(&source, &request)
        .with_context(|| format!("backtest failed for {}", request.symbol))?;

    print_summary(&report);
    let written = save_report(&report, &args.output_dir, args.csv)?;
    for path in &written {
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn batch_cmd(args: RunArgs, symbols: Vec<String>) -> Result<()> {
    let source = read_strategy(&args.strategy)?;
    let config = load_config(&args)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let base = RunRequest::from(&config.backtest);
    let requests: Vec<RunRequest> = symbols.iter().map(|s| base.for_symbol(s.as_str())).collect();
    info!(count = requests.len(), "starting batch");

    let results = orchestrator.run_batch(&source, &requests);

    println!();
    println!(
        "{:<14} {:>8} {:>14} {:>9} {:>7} {:>9} {:>8}",
        "Symbol", "Candles", "Final", "ROI", "Trades", "Win Rate", "Max DD"
    );
    println!("{}", "-".repeat(75));

    let mut failures = 0;
    for (request, result) in requests.iter().zip(&results) {
        match result {
            Ok(report) => {
                let r = &report.result;
                println!(
                    "{:<14} {:>8} {:>14.2} {:>8.2}% {:>7} {:>8.1}% {:>7.2}%",
                    report.symbol,
                    report.candle_count,
                    r.final_balance,
                    r.roi_pct,
                    r.total_trades,
                    r.win_rate_pct,
                    r.max_drawdown_pct
                );
                save_report(report, &args.output_dir, args.csv)?;
            }
            Err(e) => {
                failures += 1;
                println!("{:<14} ERROR: {e}", request.symbol);
            }
        }
    }
    println!();
    println!("Reports saved to: {}", args.output_dir.display());

    if failures == requests.len() {
        bail!("every run in the batch failed");
    }
    Ok(())
}

fn inspect_cmd(path: &Path) -> Result<()> {
    let source = read_strategy(path)?;
    let extraction = analyze(&source);

    let json = serde_json::to_string_pretty(&extraction.spec)
        .context("failed to serialize StrategySpec")?;
    println!("{json}");

    if extraction.diagnostics.is_empty() {
        eprintln!("No diagnostics.");
    } else {
        println!();
        println!("Diagnostics ({}):", extraction.diagnostics.len());
        for d in &extraction.diagnostics {
            println!("  {d}");
        }
    }
    Ok(())
}

fn cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = FileStore::new(cache_dir);
    let keys = store.keys()?;
    if keys.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp_millis();
    println!("Cache: {}", cache_dir.display());
    println!("Entries: {}", keys.len());
    println!();
    println!("{:<20} {:>10} {:>12}", "Key", "Candles", "Age");
    println!("{}", "-".repeat(44));
    for key in &keys {
        match store.get(key) {
            Ok(Some(entry)) => println!(
                "{:<20} {:>10} {:>12}",
                key,
                entry.data.len(),
                format_age(entry.age_ms(now))
            ),
            Ok(None) => {}
            Err(e) => println!("{key:<20} (unreadable: {e})"),
        }
    }
    Ok(())
}

fn cache_clear(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }
    let removed = FileStore::new(cache_dir).clear()?;
    println!("Removed {removed} cached series from {}", cache_dir.display());
    Ok(())
}

fn format_age(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    if minutes < 60 {
        format!("{minutes}m")
    } else if minutes < 48 * 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}d", minutes / (24 * 60))
    }
}

fn print_summary(report: &RunReport) {
    let r = &report.result;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", report.strategy.class_name);
    println!("Symbol:         {}", report.symbol);
    println!(
        "Data:           {} candles of {} ({} months, {})",
        report.candle_count, report.timeframe, report.months, report.data_source
    );
    println!("Dataset hash:   {}", &report.dataset_hash[..16.min(report.dataset_hash.len())]);
    println!();
    println!("--- Performance ---");
    println!("Start Balance:  {:.2}", report.starting_balance);
    println!("Final Balance:  {:.2}", r.final_balance);
    println!("ROI:            {:.2}%", r.roi_pct);
    println!(
        "Trades:         {} ({} won, {} lost)",
        r.total_trades, r.winning_trades, r.losing_trades
    );
    println!("Win Rate:       {:.1}%", r.win_rate_pct);
    println!("Avg Profit:     {:.2}", r.avg_profit);
    println!("Max Drawdown:   {:.2}%", r.max_drawdown_pct);
    println!("Sharpe:         {:.3}", r.sharpe_ratio);
    if r.has_open_position() {
        println!("Open position at end of data");
    }
    for warn in &report.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}
