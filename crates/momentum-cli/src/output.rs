//! Report rendering. JSON goes through serde; the table format is each
//! view's `Display` implementation.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::PathBuf;

use momentum_core::{BacktestReport, CacheStats, RebalanceReport, Symbol};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

const TOP_PERFORMERS: usize = 20;

pub fn render<T: Serialize + Display>(
    view: &T,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    let text = match format {
        OutputFormat::Json if pretty => serde_json::to_string_pretty(view)?,
        OutputFormat::Json => serde_json::to_string(view)?,
        OutputFormat::Table => view.to_string(),
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RebalanceView {
    #[serde(flatten)]
    pub report: RebalanceReport,
    pub dry_run: bool,
    pub portfolio_file: PathBuf,
}

impl Display for RebalanceView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let report = &self.report;
        writeln!(
            f,
            "Momentum rebalance ({}) as of {}  [run {}]",
            report.strategy, report.as_of, report.run_id
        )?;
        writeln!(
            f,
            "Window: {} .. {} ({} candles)",
            report.window.start_date,
            report.window.end_date,
            report.window.granularity.as_str()
        )?;
        writeln!(
            f,
            "Universe: {} instruments, {} ranked, {} skipped",
            report.universe_size,
            report.ranked.len(),
            report.skipped.len()
        )?;

        if !report.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped symbols:")?;
            for skip in &report.skipped {
                writeln!(
                    f,
                    "  {:<14} {:<22} {}",
                    skip.symbol.as_str(),
                    skip.reason.as_str(),
                    skip.detail
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Top {TOP_PERFORMERS} performers:")?;
        writeln!(f, "  {:>3}  {:<14} {:>10}", "#", "Symbol", "Return")?;
        for (index, record) in report.top_performers(TOP_PERFORMERS).iter().enumerate() {
            writeln!(
                f,
                "  {:>3}  {:<14} {:>+9.2}%",
                index + 1,
                record.symbol.as_str(),
                record.return_pct
            )?;
        }

        writeln!(f)?;
        write_set(f, "Buy", &report.decision.buy)?;
        write_set(f, "Sell", &report.decision.sell)?;
        write_set(f, "Hold", &report.decision.hold)?;

        if report.selection.degraded {
            writeln!(
                f,
                "\nWarning: only {} symbols ranked; the keep threshold covers the whole ranking",
                report.ranked.len()
            )?;
        }

        writeln!(
            f,
            "\nCache: {} hits, {} misses, {} entries, {} expired purged",
            report.cache.hits, report.cache.misses, report.cache.entries, report.cache.expired_purged
        )?;

        if self.dry_run {
            write!(
                f,
                "DRY RUN: {} not modified ({} holdings after rebalance)",
                self.portfolio_file.display(),
                report.target.len()
            )
        } else {
            write!(
                f,
                "Portfolio saved to {} ({} holdings)",
                self.portfolio_file.display(),
                report.target.len()
            )
        }
    }
}

fn write_set(f: &mut Formatter<'_>, label: &str, symbols: &BTreeSet<Symbol>) -> std::fmt::Result {
    let joined = symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        writeln!(f, "{label} (0): -")
    } else {
        writeln!(f, "{label} ({}): {joined}", symbols.len())
    }
}

#[derive(Debug, Serialize)]
pub struct BacktestView {
    pub reports: Vec<BacktestReport>,
}

impl Display for BacktestView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, report) in self.reports.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write_backtest(f, report)?;
        }
        Ok(())
    }
}

fn write_backtest(f: &mut Formatter<'_>, report: &BacktestReport) -> std::fmt::Result {
    writeln!(
        f,
        "Momentum backtest ({}) {} .. {}  [run {}]",
        report.strategy, report.start, report.end, report.run_id
    )?;
    writeln!(
        f,
        "  {:<10}  {:>16}  {:>14}  {:>8}  {:>4}  {:>5}",
        "Date", "Value", "Cash", "Holdings", "Buys", "Sells"
    )?;
    for point in &report.points {
        writeln!(
            f,
            "  {:<10}  {:>16.2}  {:>14.2}  {:>8}  {:>4}  {:>5}{}",
            point.date.to_string(),
            point.value,
            point.cash,
            point.holdings,
            point.buys.len(),
            point.sells.len(),
            if point.rebalanced { "" } else { "  (not rebalanced)" }
        )?;
    }

    let summary = &report.summary;
    writeln!(f)?;
    writeln!(f, "Initial capital:   {:.2}", summary.initial_capital)?;
    writeln!(f, "Final value:       {:.2}", summary.final_value)?;
    writeln!(f, "Total return:      {:+.2}%", summary.total_return * 100.0)?;
    writeln!(f, "Annualized return: {:+.2}%", summary.annualized_return * 100.0)?;
    writeln!(f, "Volatility:        {:.2}%", summary.volatility * 100.0)?;
    writeln!(f, "Sharpe ratio:      {:.2}", summary.sharpe)?;
    writeln!(f, "Max drawdown:      {:.2}%", summary.max_drawdown * 100.0)?;
    write!(
        f,
        "Rebalances:        {} of {}",
        summary.rebalances,
        report.points.len()
    )
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CacheView {
    Stats {
        dir: PathBuf,
        ttl_secs: u64,
        stats: CacheStats,
    },
    Cleared {
        dir: PathBuf,
        removed: usize,
    },
    Purged {
        dir: PathBuf,
        removed: usize,
    },
}

impl Display for CacheView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stats {
                dir,
                ttl_secs,
                stats,
            } => {
                writeln!(f, "Cache directory: {}", dir.display())?;
                writeln!(f, "TTL: {ttl_secs}s")?;
                writeln!(f, "Total entries: {}", stats.entries)?;
                writeln!(f, "Valid entries: {}", stats.valid_entries)?;
                write!(f, "Expired entries: {}", stats.expired_entries)
            }
            Self::Cleared { dir, removed } => {
                write!(f, "Cleared {removed} cache entries from {}", dir.display())
            }
            Self::Purged { dir, removed } => {
                write!(f, "Purged {removed} expired cache entries from {}", dir.display())
            }
        }
    }
}
