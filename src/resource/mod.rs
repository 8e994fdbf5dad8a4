//! Versioned files and directories
//!
//! A resource is resolved lazily: nothing runs until the first question is
//! asked, then the working-copy version is fetched once and kept for the
//! lifetime of the value. Every expensive answer goes through the metadata
//! cache, keyed by the resolved version, so asking again at the same version
//! never spawns the VCS tool twice.

mod directory;
mod file;
pub mod path;

pub use directory::{Directory, Node};
pub use file::{Blameable, DEFAULT_MIME_TYPE, Fetchable, File};

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{Backend, Target};
use crate::cache::Cache;
use crate::diff::FileDiff;
use crate::error::{Result, VcsError};
use crate::types::{Log, LogEntry, ResourceInfo};

const FACET_INFO: &str = "info";
const FACET_LOG: &str = "log";

/// A working copy on disk together with its backend and the cache its
/// resources share.
#[derive(Debug)]
pub struct WorkingCopy {
    root: PathBuf,
    backend: Arc<dyn Backend>,
    cache: Arc<Cache>,
}

impl WorkingCopy {
    pub fn new(root: impl Into<PathBuf>, backend: Arc<dyn Backend>, cache: Arc<Cache>) -> Self {
        Self {
            root: root.into(),
            backend,
            cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Whether `local` is a directory, following symlinks. `None` when it
    /// does not exist, resolves outside the working copy, or loops back to
    /// one of its own parents.
    pub(crate) fn classify(&self, local: &Path) -> Option<bool> {
        let target = std::fs::canonicalize(local).ok()?;
        let root = std::fs::canonicalize(&self.root).ok()?;
        if !target.starts_with(&root) {
            log::debug!("{} leaves the working copy, ignoring", local.display());
            return None;
        }
        let parent = local.parent().and_then(|p| std::fs::canonicalize(p).ok())?;
        if parent.starts_with(&target) {
            log::debug!("{} links to its own parent, ignoring", local.display());
            return None;
        }
        Some(target.is_dir())
    }

    /// Cache key for a root-relative path. Prefixed with the root so that
    /// checkouts sharing one cache never collide.
    fn cache_key(&self, path: &str) -> String {
        format!("{}{}", self.root.display(), path)
    }
}

/// State shared by files and directories.
#[derive(Debug, Clone)]
pub struct ResourceCore {
    copy: Arc<WorkingCopy>,
    path: String,
    info: OnceLock<ResourceInfo>,
    log: OnceLock<Log>,
}

impl ResourceCore {
    pub(crate) fn new(copy: Arc<WorkingCopy>, path: String) -> Self {
        Self {
            copy,
            path,
            info: OnceLock::new(),
            log: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn copy(&self) -> &Arc<WorkingCopy> {
        &self.copy
    }

    pub(crate) fn target(&self) -> Target<'_> {
        Target::new(self.copy.root(), &self.path)
    }

    /// Location of the resource in the working copy.
    pub fn local_path(&self) -> PathBuf {
        self.target().absolute()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.copy.backend()
    }

    pub(crate) fn cached<T: DeserializeOwned>(
        &self,
        version: Option<&str>,
        facet: &str,
    ) -> Result<Option<T>> {
        Ok(self
            .copy
            .cache()
            .get(&self.copy.cache_key(&self.path), version, facet)?)
    }

    pub(crate) fn store<T: Serialize + ?Sized>(
        &self,
        version: Option<&str>,
        facet: &str,
        value: &T,
    ) -> Result<()> {
        Ok(self
            .copy
            .cache()
            .store(&self.copy.cache_key(&self.path), version, facet, value)?)
    }

    /// Fetch a value from the cache, computing and storing it on a miss.
    pub(crate) fn cached_or_fetch<T, F>(&self, version: &str, facet: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.cached(Some(version), facet)? {
            return Ok(value);
        }
        let value = fetch()?;
        self.store(Some(version), facet, &value)?;
        Ok(value)
    }

    fn info(&self) -> Result<&ResourceInfo> {
        if let Some(info) = self.info.get() {
            return Ok(info);
        }

        let info = self.backend().info(&self.target())?;
        self.store(Some(&info.version), FACET_INFO, &info)?;
        log::debug!("resolved {} at version {}", self.path, info.version);
        Ok(self.info.get_or_init(|| info))
    }

    pub fn version_string(&self) -> Result<&str> {
        Ok(&self.info()?.version)
    }

    pub fn log(&self) -> Result<&Log> {
        if let Some(log) = self.log.get() {
            return Ok(log);
        }

        let version = self.version_string()?.to_string();
        let log = match self.cached::<Log>(Some(&version), FACET_LOG)? {
            Some(log) => log,
            None => {
                let entries = self.backend().log(&self.target(), &version)?;
                let log = Log::new(entries);
                // Keyed by the newest version the log actually reaches.
                let key = log.latest().map_or(version.as_str(), |e| e.version.as_str());
                self.store(Some(key), FACET_LOG, &log)?;
                if key != version {
                    self.store(Some(&version), FACET_LOG, &log)?;
                }
                log
            }
        };
        Ok(self.log.get_or_init(|| log))
    }

    pub fn versions(&self) -> Result<Vec<String>> {
        Ok(self.log()?.versions())
    }

    pub fn log_entry(&self, version: &str) -> Result<&LogEntry> {
        self.log()?
            .get(version)
            .ok_or_else(|| VcsError::no_such_version(&self.path, version))
    }

    /// Ensure `version` is part of this resource's history.
    pub(crate) fn require_version(&self, version: &str) -> Result<()> {
        self.log_entry(version).map(|_| ())
    }

    pub fn author(&self, version: Option<&str>) -> Result<String> {
        match version {
            None => Ok(self.info()?.author.clone()),
            Some(version) => Ok(self.log_entry(version)?.author.clone()),
        }
    }

    pub fn compare_versions(&self, a: &str, b: &str) -> Result<Ordering> {
        if a == b {
            return Ok(Ordering::Equal);
        }

        let order = self.backend().version_order();
        if let Some(ordering) = order.compare_intrinsic(a, b) {
            return Ok(ordering);
        }

        let log = self.log()?;
        let position = |v: &str| {
            log.position(v)
                .ok_or_else(|| VcsError::no_such_version(&self.path, v))
        };
        Ok(position(a)?.cmp(&position(b)?))
    }

    pub fn diff(&self, version: &str, current: Option<&str>) -> Result<Vec<FileDiff>> {
        let current = match current {
            Some(current) => current.to_string(),
            None => self.version_string()?.to_string(),
        };
        self.require_version(version)?;
        self.require_version(&current)?;

        let facet = format!("diff@{current}");
        let diff = self.cached_or_fetch(version, &facet, || {
            self.backend().diff(&self.target(), version, &current)
        })?;

        let root = self.copy.root().display().to_string();
        Ok(diff
            .into_iter()
            .map(|file| file.map_paths(|p| path::relativize(p, &root)))
            .collect())
    }
}

/// Anything addressed by a path inside a working copy.
pub trait Resource {
    fn core(&self) -> &ResourceCore;

    /// Root-relative path, `/`-separated, directories ending in `/`.
    fn path(&self) -> &str {
        self.core().path()
    }

    fn root(&self) -> &Path {
        self.core().copy().root()
    }
}

pub trait Versioned: Resource {
    /// Version of the working copy state, resolved on first use.
    fn version_string(&self) -> Result<&str> {
        self.core().version_string()
    }

    /// All versions up to the current one, oldest first.
    fn versions(&self) -> Result<Vec<String>> {
        self.core().versions()
    }

    fn compare_versions(&self, a: &str, b: &str) -> Result<Ordering> {
        self.core().compare_versions(a, b)
    }
}

pub trait Authored: Resource {
    /// Author of `version`, or of the current version when `None`.
    fn author(&self, version: Option<&str>) -> Result<String> {
        self.core().author(version)
    }
}

pub trait Logged: Resource {
    fn log(&self) -> Result<&Log> {
        self.core().log()
    }

    fn log_entry(&self, version: &str) -> Result<&LogEntry> {
        self.core().log_entry(version)
    }
}

pub trait Diffable: Resource {
    /// Changes between `version` and `current` (defaults to the current
    /// version), with root-relative paths.
    fn diff(&self, version: &str, current: Option<&str>) -> Result<Vec<FileDiff>> {
        self.core().diff(version, current)
    }
}
