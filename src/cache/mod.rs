//! Persistent metadata cache
//!
//! Values are keyed by `(path, version, facet)`. Entries for historical
//! revisions never go stale; entries for the current version are keyed by the
//! resolved version string, so a moved HEAD simply misses. A cold cache
//! behaves exactly like a warm one, only slower.

mod config;
mod lock;
mod store;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub use config::{CacheConfig, DEFAULT_CLEANUP_FRACTION, DEFAULT_MAX_SIZE_BYTES};
pub use lock::EvictionGuard;
pub use store::{ENTRY_OVERHEAD, entry_size};

use store::Store;

/// Errors returned by cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache was used before `initialize` (or after `teardown`).
    #[error("cache used before initialization")]
    NotInitialized,
    /// The value could not be serialized for storage.
    #[error("value is not cacheable: {0}")]
    NotCacheable(String),
    /// The configuration is unusable.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
    /// The SQLite store failed.
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// An underlying IO operation failed.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub entries_removed: u64,
    pub bytes_removed: u64,
}

struct Inner {
    config: CacheConfig,
    store: Store,
}

/// Handle to the metadata cache.
///
/// Constructed uninitialized; every operation fails with
/// [`CacheError::NotInitialized`] until [`Cache::initialize`] is called.
/// Share it between resources with an `Arc`.
pub struct Cache {
    inner: Mutex<Option<Inner>>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create an uninitialized cache handle.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Create and initialize a cache in one step.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let cache = Self::new();
        cache.initialize(config)?;
        Ok(cache)
    }

    /// Bind the handle to a storage directory. Re-initializing replaces the
    /// previous binding.
    pub fn initialize(&self, config: CacheConfig) -> Result<(), CacheError> {
        let fraction = config.cleanup_fraction();
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "cleanup fraction must be in (0, 1], got {fraction}"
            )));
        }

        std::fs::create_dir_all(config.dir())?;
        let store = Store::open(&config.database_path())?;
        log::debug!(
            "cache initialized at {} (limit {} bytes)",
            config.dir().display(),
            config.max_size_bytes()
        );

        *self.lock() = Some(Inner { config, store });
        Ok(())
    }

    /// Run a size-triggered cleanup and release the store.
    pub fn teardown(&self) -> Result<CleanupStats, CacheError> {
        let mut guard = self.lock();
        let stats = match guard.as_mut() {
            Some(inner) => cleanup(inner)?,
            None => return Err(CacheError::NotInitialized),
        };
        *guard = None;
        Ok(stats)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Look up a cached value. Absence is `Ok(None)`, never an error.
    ///
    /// A stored value that no longer decodes as `T` is treated as a miss.
    pub fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        version: Option<&str>,
        facet: &str,
    ) -> Result<Option<T>, CacheError> {
        let guard = self.lock();
        let inner = guard.as_ref().ok_or(CacheError::NotInitialized)?;
        let version = version.unwrap_or("");

        let Some(raw) = inner.store.get(path, version, facet)? else {
            log::trace!("cache miss: {path}@{version} [{facet}]");
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                log::warn!("ignoring undecodable cache entry {path}@{version} [{facet}]: {err}");
                Ok(None)
            }
        }
    }

    /// Store a value. Fails with [`CacheError::NotCacheable`] if the value
    /// cannot be serialized.
    pub fn store<T: Serialize + ?Sized>(
        &self,
        path: &str,
        version: Option<&str>,
        facet: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let guard = self.lock();
        let inner = guard.as_ref().ok_or(CacheError::NotInitialized)?;

        let raw =
            serde_json::to_string(value).map_err(|e| CacheError::NotCacheable(e.to_string()))?;
        let version = version.unwrap_or("");
        inner.store.put(path, version, facet, &raw)?;
        log::trace!("cached {path}@{version} [{facet}] ({} bytes)", raw.len());
        Ok(())
    }

    /// Evict the oldest entries if the store exceeds its limit, until it is
    /// at or below `max_size * cleanup_fraction`.
    pub fn force_cleanup(&self) -> Result<CleanupStats, CacheError> {
        let mut guard = self.lock();
        let inner = guard.as_mut().ok_or(CacheError::NotInitialized)?;
        cleanup(inner)
    }

    /// Total accounted size of all entries.
    pub fn total_size(&self) -> Result<u64, CacheError> {
        let guard = self.lock();
        let inner = guard.as_ref().ok_or(CacheError::NotInitialized)?;
        Ok(inner.store.total_size()?)
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64, CacheError> {
        let guard = self.lock();
        let inner = guard.as_ref().ok_or(CacheError::NotInitialized)?;
        Ok(inner.store.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Inner>> {
        self.inner.lock().unwrap()
    }
}

fn cleanup(inner: &mut Inner) -> Result<CleanupStats, CacheError> {
    let limit = inner.config.max_size_bytes();
    let mut total = inner.store.total_size()?;
    if total <= limit {
        return Ok(CleanupStats::default());
    }

    let Some(_guard) = EvictionGuard::try_hold(&inner.config.lock_path())? else {
        log::debug!("cache cleanup already running in another process, skipping");
        return Ok(CleanupStats::default());
    };

    // Another process may have finished a cleanup since the first check.
    total = inner.store.total_size()?;
    let target = inner.config.cleanup_target();
    let mut stats = CleanupStats::default();
    let mut victims = Vec::new();
    let mut newest_evicted = None;

    for entry in inner.store.entries_by_age()? {
        if total <= target {
            break;
        }
        total = total.saturating_sub(entry.size);
        stats.entries_removed += 1;
        stats.bytes_removed += entry.size;
        newest_evicted = Some(entry.created_at);
        victims.push(entry.seq);
    }

    inner.store.delete(&victims)?;
    log::info!(
        "cache cleanup removed {} entries ({} bytes), written up to {}",
        stats.entries_removed,
        stats.bytes_removed,
        newest_evicted.unwrap_or_default()
    );
    Ok(stats)
}
