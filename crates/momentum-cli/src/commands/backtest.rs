use std::path::PathBuf;

use momentum_core::{load_universe, BacktestRequest, Backtester, CacheStore, UtcDateTime};

use super::upstox_fetcher;
use crate::cli::BacktestArgs;
use crate::config::Settings;
use crate::error::CliError;
use crate::output::BacktestView;

pub async fn run(
    args: &BacktestArgs,
    settings: &Settings,
    cache_dir: PathBuf,
) -> Result<BacktestView, CliError> {
    let universe_path = args
        .universe
        .clone()
        .unwrap_or_else(|| settings.universe_file.clone());
    let universe = load_universe(&universe_path)?;

    let fetcher = upstox_fetcher(
        settings,
        CacheStore::on_disk(&cache_dir),
        args.concurrency,
        args.refresh,
    )?;
    let end = args.end.unwrap_or_else(|| UtcDateTime::now().date());

    let mut reports = Vec::new();
    for strategy in args.strategies() {
        let request = BacktestRequest {
            strategy,
            end,
            months: args.months,
            universe: universe.clone(),
        };
        let report = Backtester::new(fetcher.clone())
            .with_initial_capital(args.capital)
            .run(&request)
            .await?;
        reports.push(report);
    }

    Ok(BacktestView { reports })
}
