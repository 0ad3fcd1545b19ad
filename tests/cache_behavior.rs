//! Behavior-driven tests for the price-history cache.
//!
//! These tests verify WHEN cached data is trusted: entries younger than their
//! ttl are served without an external call, older or unreadable entries are
//! refetched, and maintenance commands report what they removed.

mod support;

use std::sync::Arc;
use std::time::Duration;

use momentum_core::{
    CacheKey, CacheMode, CacheStore, HistoryRequest, HistoryWindow, ManualClock, PriceFetcher,
    Strategy, UtcDateTime,
};
use support::{fast_policy, instrument, series_with_return, Reply, ScriptedSource};
use time::macros::date;

const HOUR: Duration = Duration::from_secs(60 * 60);

fn request(symbol: &str) -> HistoryRequest {
    HistoryRequest::new(
        instrument(symbol),
        HistoryWindow::for_strategy(Strategy::TwelveMonth, date!(2025 - 07 - 01)),
    )
}

fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        UtcDateTime::parse("2025-07-01T09:15:00Z").expect("valid timestamp"),
    ))
}

// =============================================================================
// Cache: Expiry
// =============================================================================

#[tokio::test]
async fn when_entry_is_younger_than_ttl_system_skips_the_external_call() {
    // Given: XYZ was fetched and cached at T0 with a one-hour ttl
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = start_clock();
    let source = Arc::new(ScriptedSource::new().always("XYZ", Reply::Return(9.0)));
    let cache = CacheStore::on_disk(dir.path()).with_clock(clock.clone());
    let fetcher = PriceFetcher::new(source.clone(), cache, fast_policy().with_cache_ttl(HOUR));
    fetcher.fetch(&request("XYZ")).await.expect("initial fetch");

    // When: The same request is made 59 minutes later
    clock.advance(Duration::from_secs(59 * 60));
    let series = fetcher.fetch(&request("XYZ")).await.expect("cached fetch");

    // Then: The cached payload is served and the source is not called again
    assert_eq!(series, series_with_return(request("XYZ").window, 9.0));
    assert_eq!(source.calls("XYZ"), 1);
}

#[tokio::test]
async fn when_entry_is_older_than_ttl_system_fetches_fresh_data() {
    // Given: XYZ was cached at T0 and its upstream return has since changed
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = start_clock();
    let source = Arc::new(ScriptedSource::new().sequence(
        "XYZ",
        vec![Reply::Return(9.0)],
        Reply::Return(11.0),
    ));
    let cache = CacheStore::on_disk(dir.path()).with_clock(clock.clone());
    let fetcher = PriceFetcher::new(source.clone(), cache, fast_policy().with_cache_ttl(HOUR));
    fetcher.fetch(&request("XYZ")).await.expect("initial fetch");

    // When: The same request is made 61 minutes later
    clock.advance(Duration::from_secs(61 * 60));
    let series = fetcher.fetch(&request("XYZ")).await.expect("fresh fetch");

    // Then: The expired entry is a miss and the fresh payload replaces it
    assert_eq!(series, series_with_return(request("XYZ").window, 11.0));
    assert_eq!(source.calls("XYZ"), 2);

    let stats = fetcher.cache().stats().await.expect("stats");
    assert_eq!(stats.expired_purged, 1);
    assert_eq!(stats.valid_entries, 1);
}

#[tokio::test]
async fn when_entry_is_exactly_ttl_old_system_treats_it_as_expired() {
    let clock = start_clock();
    let cache = CacheStore::in_memory().with_clock(clock.clone());
    let key = CacheKey::for_request(&request("XYZ")).expect("key");
    let series = series_with_return(request("XYZ").window, 3.0);
    cache.put(&key, &series, HOUR).await.expect("put");

    clock.advance(HOUR);

    assert_eq!(cache.get(&key).await, None);
}

#[tokio::test]
async fn when_cache_directory_is_reopened_system_still_serves_entries() {
    // Given: One store instance wrote an entry
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = start_clock();
    let key = CacheKey::for_request(&request("XYZ")).expect("key");
    let series = series_with_return(request("XYZ").window, 4.0);
    CacheStore::on_disk(dir.path())
        .with_clock(clock.clone())
        .put(&key, &series, HOUR)
        .await
        .expect("put");

    // When: A later run opens the same directory
    let reopened = CacheStore::on_disk(dir.path()).with_clock(clock);

    // Then: The entry is served from disk
    assert_eq!(reopened.get(&key).await, Some(series));
}

// =============================================================================
// Cache: Damage and Modes
// =============================================================================

#[tokio::test]
async fn when_entry_file_is_corrupt_system_refetches_and_repairs_it() {
    // Given: A cached entry whose file was truncated
    let dir = tempfile::tempdir().expect("tempdir");
    let source = Arc::new(ScriptedSource::new().always("XYZ", Reply::Return(6.0)));
    let fetcher = PriceFetcher::new(
        source.clone(),
        CacheStore::on_disk(dir.path()),
        fast_policy(),
    );
    fetcher.fetch(&request("XYZ")).await.expect("initial fetch");

    let key = CacheKey::for_request(&request("XYZ")).expect("key");
    let path = dir.path().join(format!("{}.json", key.digest()));
    std::fs::write(&path, b"{\"key\":").expect("truncate entry");

    // When: The same request is made
    let series = fetcher.fetch(&request("XYZ")).await.expect("refetch");

    // Then: The corrupt entry counted as a miss and was rewritten
    assert_eq!(series, series_with_return(request("XYZ").window, 6.0));
    assert_eq!(source.calls("XYZ"), 2);
    assert_eq!(fetcher.cache().get(&key).await, Some(series));
}

#[tokio::test]
async fn when_cache_is_bypassed_system_neither_reads_nor_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = Arc::new(ScriptedSource::new().always("XYZ", Reply::Return(2.0)));
    let fetcher = PriceFetcher::new(
        source.clone(),
        CacheStore::on_disk(dir.path()),
        fast_policy(),
    )
    .with_cache_mode(CacheMode::Bypass);

    fetcher.fetch(&request("XYZ")).await.expect("first");
    fetcher.fetch(&request("XYZ")).await.expect("second");

    assert_eq!(source.calls("XYZ"), 2);
    assert_eq!(fetcher.cache().stats().await.expect("stats").entries, 0);
}

// =============================================================================
// Cache: Maintenance
// =============================================================================

#[tokio::test]
async fn when_maintenance_runs_system_reports_what_it_removed() {
    // Given: One fresh and two expired entries on disk
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = start_clock();
    let cache = CacheStore::on_disk(dir.path()).with_clock(clock.clone());
    for (symbol, ttl) in [("AAA", HOUR), ("BBB", HOUR), ("CCC", 3 * HOUR)] {
        let key = CacheKey::for_request(&request(symbol)).expect("key");
        let series = series_with_return(request(symbol).window, 1.0);
        cache.put(&key, &series, ttl).await.expect("put");
    }
    clock.advance(2 * HOUR);

    // When: Stats are taken and expired entries purged
    let before = cache.stats().await.expect("stats");
    let purged = cache.purge_expired().await.expect("purge");
    let after = cache.stats().await.expect("stats");

    // Then: Counts line up across the operations
    assert_eq!((before.valid_entries, before.expired_entries), (1, 2));
    assert_eq!(purged, 2);
    assert_eq!((after.entries, after.valid_entries), (1, 1));

    // And: Clearing removes whatever is left
    assert_eq!(cache.clear_all().await.expect("clear"), 1);
    assert_eq!(cache.stats().await.expect("stats").entries, 0);
}

#[tokio::test]
async fn when_workers_share_a_key_system_never_serves_a_partial_entry() {
    // Given: Many writers and readers racing on one key
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = CacheStore::on_disk(dir.path());
    let key = CacheKey::for_request(&request("XYZ")).expect("key");
    let window = request("XYZ").window;
    let candidates: Vec<_> = (0..8)
        .map(|i| series_with_return(window, f64::from(i)))
        .collect();

    // When: Writes and reads interleave
    let mut tasks = tokio::task::JoinSet::new();
    for series in candidates.clone() {
        let (writer_cache, writer_key) = (cache.clone(), key.clone());
        tasks.spawn(async move {
            writer_cache.put(&writer_key, &series, HOUR).await.expect("put");
            None
        });
        let (reader_cache, reader_key) = (cache.clone(), key.clone());
        tasks.spawn(async move { reader_cache.get(&reader_key).await });
    }

    // Then: Every read is either a miss or one complete written series
    while let Some(result) = tasks.join_next().await {
        if let Some(series) = result.expect("task") {
            assert!(candidates.contains(&series));
        }
    }
    let final_entry = cache.get(&key).await.expect("an entry survives");
    assert!(candidates.contains(&final_entry));
    assert_eq!(cache.stats().await.expect("stats").entries, 1);
}
