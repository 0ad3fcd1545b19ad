use std::path::PathBuf;

use momentum_core::CacheStore;
use tracing::info;

use crate::cli::CacheCommand;
use crate::config::Settings;
use crate::error::CliError;
use crate::output::CacheView;

pub async fn run(
    command: &CacheCommand,
    settings: &Settings,
    dir: PathBuf,
) -> Result<CacheView, CliError> {
    let cache = CacheStore::on_disk(&dir);

    let view = match command {
        CacheCommand::Stats => CacheView::Stats {
            ttl_secs: settings.cache_ttl.as_secs(),
            stats: cache.stats().await?,
            dir,
        },
        CacheCommand::Clear => {
            let removed = cache.clear_all().await?;
            info!(removed, dir = %dir.display(), "cache cleared");
            CacheView::Cleared { dir, removed }
        }
        CacheCommand::Purge => {
            let removed = cache.purge_expired().await?;
            info!(removed, dir = %dir.display(), "expired cache entries purged");
            CacheView::Purged { dir, removed }
        }
    };

    Ok(view)
}
