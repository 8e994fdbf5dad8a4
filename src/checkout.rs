//! Working-copy lifecycle
//!
//! A [`Checkout`] only exists once its working copy does: it is obtained
//! either by [`Checkout::initialize`], which runs the backend's clone or
//! checkout, or by [`Checkout::open`] on a directory that already is one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Backend, validate_version};
use crate::cache::Cache;
use crate::error::{Result, VcsError};
use crate::resource::{
    Authored, Diffable, Directory, File, Logged, Resource, ResourceCore, Versioned, WorkingCopy,
    path,
};

/// Result of resolving a path inside a checkout.
#[derive(Debug)]
pub enum Entry<'a> {
    /// The checkout root itself.
    Root(&'a Checkout),
    File(File),
    Directory(Directory),
}

impl Entry<'_> {
    pub fn path(&self) -> &str {
        match self {
            Self::Root(checkout) => checkout.path(),
            Self::File(file) => file.path(),
            Self::Directory(dir) => dir.path(),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn into_directory(self) -> Option<Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::Root(checkout) => Some(checkout.root_dir.clone()),
            Self::File(_) => None,
        }
    }
}

/// A working copy bound to a repository.
#[derive(Debug)]
pub struct Checkout {
    copy: Arc<WorkingCopy>,
    root_dir: Directory,
}

impl Checkout {
    /// Check out `source` into `root` and return the new working copy.
    pub fn initialize(
        root: impl Into<PathBuf>,
        backend: Arc<dyn Backend>,
        cache: Arc<Cache>,
        source: &str,
    ) -> Result<Self> {
        let root = std::path::absolute(root.into())?;
        std::fs::create_dir_all(&root)?;

        log::info!(
            "initializing {} checkout of {source} at {}",
            backend.kind(),
            root.display()
        );
        backend.initialize(&root, source)?;
        Ok(Self::bind(root, backend, cache))
    }

    /// Bind to an existing working copy. A relative `root` is resolved
    /// against the current directory so cache keys name one working copy.
    pub fn open(root: impl Into<PathBuf>, backend: Arc<dyn Backend>, cache: Arc<Cache>) -> Result<Self> {
        let root = std::path::absolute(root.into())?;
        if !root.join(backend.metadata_dir()).is_dir() {
            return Err(VcsError::RepositoryNotFound {
                backend: backend.kind().to_string(),
                path: root.display().to_string(),
            });
        }
        Ok(Self::bind(root, backend, cache))
    }

    fn bind(root: PathBuf, backend: Arc<dyn Backend>, cache: Arc<Cache>) -> Self {
        let copy = Arc::new(WorkingCopy::new(root, backend, cache));
        let root_dir = Directory::new(copy.clone(), "/");
        Self { copy, root_dir }
    }

    pub fn working_copy(&self) -> &Arc<WorkingCopy> {
        &self.copy
    }

    pub fn local_path(&self) -> &Path {
        self.copy.root()
    }

    /// Pull upstream changes, or move to `version`. Returns whether anything
    /// changed; "already up to date" is `Ok(false)`.
    ///
    /// Resources obtained before the update keep describing the old state.
    pub fn update(&mut self, version: Option<&str>) -> Result<bool> {
        if let Some(version) = version {
            validate_version(version)?;
        }

        let changed = self.copy.backend().update(self.copy.root(), version)?;
        log::info!(
            "updated {} to {}: {}",
            self.copy.root().display(),
            version.unwrap_or("latest"),
            if changed { "changed" } else { "no changes" }
        );

        self.root_dir = Directory::new(self.copy.clone(), "/");
        Ok(changed)
    }

    /// Resolve a path inside the checkout. `/` and the empty path give the
    /// checkout itself; anything climbing out of the root is not found.
    pub fn get(&self, requested: &str) -> Result<Entry<'_>> {
        let parts = path::components(requested)
            .ok_or_else(|| VcsError::FileNotFound(requested.to_string()))?;
        if parts.is_empty() {
            return Ok(Entry::Root(self));
        }
        if parts.first() == Some(&self.copy.backend().metadata_dir()) {
            return Err(VcsError::FileNotFound(requested.to_string()));
        }

        let local = parts
            .iter()
            .fold(self.copy.root().to_path_buf(), |acc, part| acc.join(part));
        let is_dir = self
            .copy
            .classify(&local)
            .ok_or_else(|| VcsError::FileNotFound(requested.to_string()))?;

        if is_dir {
            Ok(Entry::Directory(Directory::new(
                self.copy.clone(),
                path::dir_path(&parts),
            )))
        } else {
            Ok(Entry::File(File::new(self.copy.clone(), path::file_path(&parts))))
        }
    }

    /// The root directory of the checkout.
    pub fn root_dir(&self) -> &Directory {
        &self.root_dir
    }
}

impl PartialEq for Checkout {
    fn eq(&self, other: &Self) -> bool {
        self.copy.root() == other.copy.root()
    }
}

impl Resource for Checkout {
    fn core(&self) -> &ResourceCore {
        self.root_dir.core()
    }
}

impl Versioned for Checkout {}
impl Authored for Checkout {}
impl Logged for Checkout {}
impl Diffable for Checkout {}

impl std::ops::Deref for Checkout {
    type Target = Directory;

    fn deref(&self) -> &Directory {
        &self.root_dir
    }
}
