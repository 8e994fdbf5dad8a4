//! Cache location and size limits
//!
//! The on-disk layout is small:
//!
//! ```text
//! ~/.cache/vcs-wrapper/
//! ├── metadata.db      # SQLite entry store
//! └── cleanup.lock     # flock held while evicting
//! ```

use std::path::{Path, PathBuf};

/// Default size limit for the metadata store (10 MiB).
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Default fraction of the limit to shrink to when cleaning up.
pub const DEFAULT_CLEANUP_FRACTION: f64 = 0.8;

/// Where the cache lives and how large it may grow.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    dir: PathBuf,
    max_size_bytes: u64,
    cleanup_fraction: f64,
}

impl CacheConfig {
    /// Creates a config rooted at `dir` with the default limits.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            cleanup_fraction: DEFAULT_CLEANUP_FRACTION,
        }
    }

    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_cleanup_fraction(mut self, cleanup_fraction: f64) -> Self {
        self.cleanup_fraction = cleanup_fraction;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn cleanup_fraction(&self) -> f64 {
        self.cleanup_fraction
    }

    /// Returns the database path: `{dir}/metadata.db`
    pub fn database_path(&self) -> PathBuf {
        self.dir.join("metadata.db")
    }

    /// Returns the cleanup lock path: `{dir}/cleanup.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("cleanup.lock")
    }

    /// Size the store is shrunk to by a cleanup.
    pub fn cleanup_target(&self) -> u64 {
        (self.max_size_bytes as f64 * self.cleanup_fraction).floor() as u64
    }
}

impl Default for CacheConfig {
    /// Uses the system cache directory + "vcs-wrapper"
    ///
    /// `dirs::cache_dir()` resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("vcs-wrapper"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_limits() {
        let config = CacheConfig::new("cache-root");
        assert_eq!(config.dir(), Path::new("cache-root"));
        assert_eq!(config.max_size_bytes(), DEFAULT_MAX_SIZE_BYTES);
        assert_eq!(config.cleanup_fraction(), DEFAULT_CLEANUP_FRACTION);
    }

    #[test]
    fn test_default_ends_with_crate_dir() {
        let config = CacheConfig::default();
        assert!(config.dir().ends_with("vcs-wrapper"));
    }

    #[test]
    fn test_paths() {
        let config = CacheConfig::new("cache-root");
        assert_eq!(
            config.database_path(),
            PathBuf::from("cache-root").join("metadata.db")
        );
        assert_eq!(
            config.lock_path(),
            PathBuf::from("cache-root").join("cleanup.lock")
        );
    }

    #[test]
    fn test_cleanup_target() {
        let config = CacheConfig::new("x")
            .with_max_size(50)
            .with_cleanup_fraction(0.8);
        assert_eq!(config.cleanup_target(), 40);
    }
}
