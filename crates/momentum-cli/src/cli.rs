//! CLI argument definitions for the momentum rebalancer.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rebalance` | Rank the universe and rebalance the paper portfolio |
//! | `backtest` | Replay monthly rebalances over past months |
//! | `cache stats` | Show cache directory, ttl and entry counts |
//! | `cache clear` | Remove every cached response |
//! | `cache purge` | Remove expired cached responses |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `table` | Output format (table, json) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--cache-dir` | `$MOMENTUM_CACHE_DIR` or `.cache` | Cache directory |
//!
//! # Examples
//!
//! ```bash
//! # Monthly 12-month momentum rebalance
//! momentum rebalance --strategy 12m
//!
//! # See what the 6-month strategy would do, ignoring cached prices
//! momentum rebalance --strategy 6m --dry-run --refresh
//!
//! # Replay both strategies over the last year
//! momentum backtest --months 12 --capital 1000000
//!
//! # Inspect the cache
//! momentum cache stats --format json --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use momentum_core::{parse_date, Strategy, DEFAULT_BACKTEST_MONTHS, DEFAULT_INITIAL_CAPITAL};
use time::Date;

/// Momentum rebalancer for the NSE 200.
///
/// Ranks the index by trailing return, buys the top 20, sells anything that
/// fell out of the top 40 and keeps the rest.
#[derive(Debug, Parser)]
#[command(
    name = "momentum",
    author,
    version,
    about = "Monthly momentum rebalancer for the NSE 200"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Cache directory (overrides MOMENTUM_CACHE_DIR).
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rank the universe and rebalance the paper portfolio.
    ///
    /// # Examples
    ///
    ///   momentum rebalance --strategy 12m
    ///   momentum rebalance --strategy 6m --dry-run --as-of 2025-07-01
    Rebalance(RebalanceArgs),

    /// Replay monthly rebalances over past months on a paper account.
    ///
    /// Portfolio files are never read or written.
    ///
    /// # Examples
    ///
    ///   momentum backtest
    ///   momentum backtest --strategy 6m --months 24 --end 2025-06-30
    Backtest(BacktestArgs),

    /// Cache management commands.
    Cache(CacheArgs),
}

/// Arguments for the `rebalance` command.
#[derive(Debug, Args)]
pub struct RebalanceArgs {
    /// Lookback strategy: 6m (26 weeks) or 12m (52 weeks).
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Strategy,

    /// Compute the decision without writing the portfolio file.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Remove every cached response before running.
    #[arg(long, default_value_t = false)]
    pub clear_cache: bool,

    /// Ignore cached responses but store fresh ones.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Rebalance date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long, value_parser = parse_as_of)]
    pub as_of: Option<Date>,

    /// Universe CSV with Symbol and instrument_key columns.
    #[arg(long)]
    pub universe: Option<PathBuf>,

    /// Portfolio CSV; defaults to portfolio.csv (12m) or portfolio6.csv (6m).
    #[arg(long)]
    pub portfolio: Option<PathBuf>,

    /// Maximum concurrent price requests.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the `backtest` command.
#[derive(Debug, Args)]
pub struct BacktestArgs {
    /// Strategy to replay; both when omitted.
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<Strategy>,

    /// Number of monthly steps before the end date.
    #[arg(long, default_value_t = DEFAULT_BACKTEST_MONTHS)]
    pub months: u32,

    /// Starting cash of the paper account.
    #[arg(long, default_value_t = DEFAULT_INITIAL_CAPITAL, value_parser = parse_capital)]
    pub capital: f64,

    /// Last rebalance date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long, value_parser = parse_as_of)]
    pub end: Option<Date>,

    /// Universe CSV with Symbol and instrument_key columns.
    #[arg(long)]
    pub universe: Option<PathBuf>,

    /// Ignore cached responses but store fresh ones.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Maximum concurrent price requests.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl BacktestArgs {
    pub fn strategies(&self) -> Vec<Strategy> {
        match self.strategy {
            Some(strategy) => vec![strategy],
            None => Strategy::ALL.to_vec(),
        }
    }
}

/// Arguments for the `cache` command group.
#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache management subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show directory, ttl and total/valid/expired entry counts.
    Stats,
    /// Remove every cached response.
    Clear,
    /// Remove expired and unreadable cached responses.
    Purge,
}

fn parse_strategy(value: &str) -> Result<Strategy, String> {
    value.parse::<Strategy>().map_err(|error| error.to_string())
}

fn parse_as_of(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|error| error.to_string())
}

fn parse_capital(value: &str) -> Result<f64, String> {
    match value.trim().parse::<f64>() {
        Ok(capital) if capital.is_finite() && capital > 0.0 => Ok(capital),
        Ok(_) => Err(String::from("capital must be a positive amount")),
        Err(error) => Err(error.to_string()),
    }
}
