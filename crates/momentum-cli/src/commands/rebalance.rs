use std::path::PathBuf;

use momentum_core::{
    load_universe, CacheStore, CsvPortfolioStore, PortfolioStore, RebalanceRequest, Rebalancer,
    UtcDateTime,
};
use tracing::info;

use super::upstox_fetcher;
use crate::cli::RebalanceArgs;
use crate::config::Settings;
use crate::error::CliError;
use crate::output::RebalanceView;

pub async fn run(
    args: &RebalanceArgs,
    settings: &Settings,
    cache_dir: PathBuf,
) -> Result<RebalanceView, CliError> {
    let universe_path = args
        .universe
        .clone()
        .unwrap_or_else(|| settings.universe_file.clone());
    let universe = load_universe(&universe_path)?;

    let portfolio_file = args
        .portfolio
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.strategy.default_portfolio_file()));
    let store = CsvPortfolioStore::new(&portfolio_file);
    let current = store.load()?;

    let cache = CacheStore::on_disk(&cache_dir);
    if args.clear_cache {
        let removed = cache.clear_all().await?;
        info!(removed, dir = %cache_dir.display(), "cache cleared before run");
    }

    let fetcher = upstox_fetcher(settings, cache, args.concurrency, args.refresh)?;

    let request = RebalanceRequest {
        strategy: args.strategy,
        as_of: args.as_of.unwrap_or_else(|| UtcDateTime::now().date()),
        universe,
        current,
    };
    let report = Rebalancer::new(fetcher).run(&request).await?;

    if args.dry_run {
        info!(path = %portfolio_file.display(), "dry run; portfolio not written");
    } else {
        store.save(&report.target)?;
    }

    Ok(RebalanceView {
        report,
        dry_run: args.dry_run,
        portfolio_file,
    })
}
