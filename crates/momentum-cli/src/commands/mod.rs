mod backtest;
mod cache;
mod rebalance;

use std::path::PathBuf;
use std::sync::Arc;

use momentum_core::{
    CacheMode, CacheStore, FetchPolicy, PriceFetcher, ReqwestHttpClient, UpstoxSource,
};

use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let settings = Settings::from_env()?;
    let cache_dir = resolve_cache_dir(cli, &settings);

    match &cli.command {
        Command::Rebalance(args) => {
            let view = rebalance::run(args, &settings, cache_dir).await?;
            output::render(&view, cli.format, cli.pretty)
        }
        Command::Backtest(args) => {
            let view = backtest::run(args, &settings, cache_dir).await?;
            output::render(&view, cli.format, cli.pretty)
        }
        Command::Cache(args) => {
            let view = cache::run(&args.command, &settings, cache_dir).await?;
            output::render(&view, cli.format, cli.pretty)
        }
    }
}

fn resolve_cache_dir(cli: &Cli, settings: &Settings) -> PathBuf {
    cli.cache_dir
        .clone()
        .unwrap_or_else(|| settings.cache_dir.clone())
}

/// Upstox-backed fetcher over the on-disk cache in `cache`.
fn upstox_fetcher(
    settings: &Settings,
    cache: CacheStore,
    concurrency: Option<usize>,
    refresh: bool,
) -> Result<PriceFetcher, CliError> {
    let token = settings.require_token()?;

    let mut policy = FetchPolicy::upstox_default().with_cache_ttl(settings.cache_ttl);
    if let Some(concurrency) = concurrency {
        policy = policy.with_max_concurrency(concurrency);
    }

    let source = UpstoxSource::new(Arc::new(ReqwestHttpClient::new()), token)
        .with_base_url(settings.base_url.as_str())
        .with_timeout(policy.request_timeout);
    let cache_mode = if refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    Ok(PriceFetcher::new(Arc::new(source), cache, policy).with_cache_mode(cache_mode))
}
