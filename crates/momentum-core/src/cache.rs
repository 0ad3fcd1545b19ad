//! Age-bounded cache for price histories.
//!
//! Entries carry their own creation time and ttl; an entry is valid while
//! `now - created_at < ttl`. Expired and corrupt entries read as a miss and are
//! removed on the way out. The disk backend keeps one JSON file per key and
//! replaces it atomically (temp file + rename), so concurrent workers never
//! observe a half-written entry. Removing a stale entry never removes a
//! fresher one that another worker wrote in the meantime.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::HistoryRequest;
use crate::{PriceSeries, UtcDateTime};

const ENTRY_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";
const STALE_SUFFIX: &str = ".stale";

/// Defines how the fetch layer uses the cache for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read non-expired entries; write fresh responses. (Default)
    #[default]
    Use,
    /// Skip reads but write fresh responses.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock lock should not be poisoned");
        *now = now.saturating_add(by);
    }

    pub fn set(&self, to: UtcDateTime) {
        *self.now.lock().expect("manual clock lock should not be poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().expect("manual clock lock should not be poisoned")
    }
}

/// Content-addressed cache key: SHA-256 over the canonical request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    label: String,
}

impl CacheKey {
    /// Hash any serializable request descriptor. Struct field order is fixed
    /// by the type, so equal requests always hash equally.
    pub fn from_descriptor<T: Serialize>(
        descriptor: &T,
        label: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let canonical = serde_json::to_string(descriptor)?;
        Ok(Self {
            digest: sha256_hex(&canonical),
            label: label.into(),
        })
    }

    /// Key for a price-history request.
    pub fn for_request(request: &HistoryRequest) -> Result<Self, CacheError> {
        Self::from_descriptor(&request.descriptor(), request.to_string())
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Human-readable description of the request, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Errors from the cache backends. Reads never surface these to callers;
/// they are logged and treated as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt cache entry at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    request: String,
    created_at: UtcDateTime,
    ttl_secs: u64,
    payload: PriceSeries,
}

impl CacheEntry {
    fn is_valid_at(&self, now: UtcDateTime) -> bool {
        self.created_at.age_at(now) < Duration::from_secs(self.ttl_secs)
    }
}

/// Counters and a scan of stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub expired_purged: u64,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_purged: AtomicU64,
}

enum Backend {
    Memory(tokio::sync::RwLock<HashMap<String, CacheEntry>>),
    Disk { dir: PathBuf },
}

/// Thread-safe price-history cache shared by all fetch workers.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<Backend>,
    clock: Arc<dyn Clock>,
    counters: Arc<CacheCounters>,
}

impl CacheStore {
    /// Durable cache with one file per key under `dir`.
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::with_backend(Backend::Disk { dir: dir.into() })
    }

    /// Process-local cache; nothing survives the run.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(tokio::sync::RwLock::new(HashMap::new())))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
            clock: Arc::new(SystemClock),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory backing the cache, if it is durable.
    pub fn dir(&self) -> Option<&Path> {
        match self.backend.as_ref() {
            Backend::Disk { dir } => Some(dir.as_path()),
            Backend::Memory(_) => None,
        }
    }

    /// Returns the cached series if a non-expired entry exists.
    ///
    /// Expired entries are purged; corrupt entries are logged and purged.
    pub async fn get(&self, key: &CacheKey) -> Option<PriceSeries> {
        let now = self.clock.now();

        let entry = match self.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(error) => {
                warn!(key = key.label(), %error, "discarding unreadable cache entry");
                self.discard_stale(key, None).await;
                self.record_miss();
                return None;
            }
        };

        if entry.is_valid_at(now) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(
                key = key.label(),
                age_secs = entry.created_at.age_at(now).as_secs(),
                "cache hit"
            );
            Some(entry.payload)
        } else {
            debug!(key = key.label(), "cache entry expired");
            self.discard_stale(key, Some(&entry)).await;
            self.counters.expired_purged.fetch_add(1, Ordering::Relaxed);
            self.record_miss();
            None
        }
    }

    /// Stores `series` under `key`, replacing any previous entry.
    pub async fn put(
        &self,
        key: &CacheKey,
        series: &PriceSeries,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.digest().to_owned(),
            request: key.label().to_owned(),
            created_at: self.clock.now(),
            ttl_secs: ttl.as_secs(),
            payload: series.clone(),
        };

        match self.backend.as_ref() {
            Backend::Memory(map) => {
                map.write().await.insert(entry.key.clone(), entry);
            }
            Backend::Disk { dir } => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|error| CacheError::io(dir, error))?;

                let target = entry_path(dir, key.digest());
                let temp = dir.join(format!(
                    ".{}.{}{}",
                    key.digest(),
                    uuid::Uuid::new_v4().simple(),
                    TEMP_SUFFIX
                ));
                let body = serde_json::to_vec_pretty(&entry)?;

                if let Err(error) = tokio::fs::write(&temp, body).await {
                    let _ = tokio::fs::remove_file(&temp).await;
                    return Err(CacheError::io(&temp, error));
                }
                if let Err(error) = tokio::fs::rename(&temp, &target).await {
                    let _ = tokio::fs::remove_file(&temp).await;
                    return Err(CacheError::io(&target, error));
                }
            }
        }

        debug!(key = key.label(), ttl_secs = ttl.as_secs(), "cache set");
        Ok(())
    }

    /// Removes every entry. Returns the number of entries removed.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        match self.backend.as_ref() {
            Backend::Memory(map) => {
                let mut map = map.write().await;
                let removed = map.len();
                map.clear();
                Ok(removed)
            }
            Backend::Disk { dir } => {
                let mut removed = 0;
                for path in list_dir(dir).await? {
                    if is_entry_file(&path) {
                        remove_if_present(&path).await?;
                        removed += 1;
                    } else if is_temp_file(&path) {
                        remove_if_present(&path).await?;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Removes expired and unreadable entries. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let removed = match self.backend.as_ref() {
            Backend::Memory(map) => {
                let mut map = map.write().await;
                let before = map.len();
                map.retain(|_, entry| entry.is_valid_at(now));
                before - map.len()
            }
            Backend::Disk { dir } => {
                let mut removed = 0;
                for path in list_dir(dir).await? {
                    if !is_entry_file(&path) {
                        continue;
                    }
                    let keep = matches!(read_entry(&path).await, Ok(Some(entry)) if entry.is_valid_at(now));
                    if !keep {
                        remove_if_present(&path).await?;
                        removed += 1;
                    }
                }
                removed
            }
        };

        self.counters
            .expired_purged
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Hit/miss counters for this process plus a scan of stored entries.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let (mut valid_entries, mut expired_entries) = (0, 0);

        match self.backend.as_ref() {
            Backend::Memory(map) => {
                for entry in map.read().await.values() {
                    if entry.is_valid_at(now) {
                        valid_entries += 1;
                    } else {
                        expired_entries += 1;
                    }
                }
            }
            Backend::Disk { dir } => {
                for path in list_dir(dir).await? {
                    if !is_entry_file(&path) {
                        continue;
                    }
                    match read_entry(&path).await {
                        Ok(Some(entry)) if entry.is_valid_at(now) => valid_entries += 1,
                        Ok(None) => {}
                        _ => expired_entries += 1,
                    }
                }
            }
        }

        Ok(CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entries: valid_entries + expired_entries,
            expired_purged: self.counters.expired_purged.load(Ordering::Relaxed),
            valid_entries,
            expired_entries,
        })
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        match self.backend.as_ref() {
            Backend::Memory(map) => Ok(map.read().await.get(key.digest()).cloned()),
            Backend::Disk { dir } => {
                let path = entry_path(dir, key.digest());
                let entry = read_entry(&path).await?;
                match entry {
                    Some(entry) if entry.key != key.digest() => Err(CacheError::Corrupt {
                        path,
                        reason: String::from("stored key does not match file name"),
                    }),
                    other => Ok(other),
                }
            }
        }
    }

    /// Removes the entry under `key` only if it is still the one observed
    /// (`None` for an unreadable file). A replacement written since is kept.
    async fn discard_stale(&self, key: &CacheKey, observed: Option<&CacheEntry>) {
        match self.backend.as_ref() {
            Backend::Memory(map) => {
                let mut map = map.write().await;
                if observed.is_some() && map.get(key.digest()) == observed {
                    map.remove(key.digest());
                }
            }
            Backend::Disk { dir } => {
                if let Err(error) = discard_stale_file(dir, key, observed).await {
                    warn!(key = key.label(), %error, "failed to remove cache entry");
                }
            }
        }
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
    }
}

fn entry_path(dir: &Path, digest: &str) -> PathBuf {
    dir.join(format!("{digest}.{ENTRY_EXTENSION}"))
}

fn is_entry_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden && path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION)
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with('.') && (name.ends_with(TEMP_SUFFIX) || name.ends_with(STALE_SUFFIX))
        })
}

// The entry is moved aside first so the check and the removal see the same
// file. If the moved file turns out to be a newer write, it is linked back
// unless yet another write has already taken its place.
async fn discard_stale_file(
    dir: &Path,
    key: &CacheKey,
    observed: Option<&CacheEntry>,
) -> Result<(), CacheError> {
    let target = entry_path(dir, key.digest());
    let tombstone = dir.join(format!(
        ".{}.{}{}",
        key.digest(),
        uuid::Uuid::new_v4().simple(),
        STALE_SUFFIX
    ));

    match tokio::fs::rename(&target, &tombstone).await {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(CacheError::io(&target, error)),
    }

    let superseded = match read_entry(&tombstone).await {
        Ok(Some(entry)) => Some(&entry) != observed && entry.key == key.digest(),
        Ok(None) | Err(CacheError::Corrupt { .. }) => false,
        Err(error) => return Err(error),
    };

    if superseded {
        match tokio::fs::hard_link(&tombstone, &target).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(error) => {
                let _ = tokio::fs::remove_file(&tombstone).await;
                return Err(CacheError::io(&target, error));
            }
        }
    }

    remove_if_present(&tombstone).await
}

async fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(CacheError::io(path, error)),
    };

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|error| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
}

async fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(CacheError::io(path, error)),
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(CacheError::io(dir, error)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|error| CacheError::io(dir, error))?
    {
        paths.push(entry.path());
    }
    Ok(paths)
}
