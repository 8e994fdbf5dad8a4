//! Working copies opened through the same relative path from different
//! directories must not share cache entries.
//!
//! Changes the process working directory, so it lives alone in this binary.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use vcs_wrapper::backend::{Backend, BackendKind, Target, VersionOrder};
use vcs_wrapper::cache::{Cache, CacheConfig};
use vcs_wrapper::checkout::Checkout;
use vcs_wrapper::diff::FileDiff;
use vcs_wrapper::error::Result;
use vcs_wrapper::resource::{Logged, Resource};
use vcs_wrapper::types::{BlameLine, Log, LogEntry, ResourceInfo};

/// Numeric-revision backend whose history names the working copy it was
/// read from.
#[derive(Debug)]
struct RootEchoBackend;

impl Backend for RootEchoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Svn
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::Numeric
    }

    fn initialize(&self, _root: &Path, _source: &str) -> Result<()> {
        Ok(())
    }

    fn update(&self, _root: &Path, _version: Option<&str>) -> Result<bool> {
        Ok(false)
    }

    fn info(&self, _target: &Target<'_>) -> Result<ResourceInfo> {
        Ok(ResourceInfo {
            version: "1".into(),
            author: "kore".into(),
        })
    }

    fn log(&self, target: &Target<'_>, _version: &str) -> Result<Vec<LogEntry>> {
        let root = std::fs::canonicalize(target.root)?;
        Ok(vec![LogEntry::new("1", root.display().to_string(), "", 0)])
    }

    fn diff(&self, _target: &Target<'_>, _from: &str, _to: &str) -> Result<Vec<FileDiff>> {
        Ok(Vec::new())
    }

    fn cat(&self, _target: &Target<'_>, _version: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn blame(
        &self,
        _target: &Target<'_>,
        _version: &str,
        _log: &Log,
    ) -> Result<Option<Vec<BlameLine>>> {
        Ok(None)
    }
}

fn working_copy(parent: &Path) {
    std::fs::create_dir_all(parent.join("wc/.svn")).unwrap();
    std::fs::write(parent.join("wc/file"), "Some test file\n").unwrap();
}

fn author_via_relative_root(dir: &Path, cache: &Arc<Cache>) -> (String, std::path::PathBuf) {
    std::env::set_current_dir(dir).unwrap();
    let checkout = Checkout::open("wc", Arc::new(RootEchoBackend), cache.clone()).unwrap();
    let file = checkout.get("/file").unwrap().into_file().unwrap();
    assert_eq!(file.path(), "/file");
    (
        file.log_entry("1").unwrap().author.clone(),
        checkout.local_path().to_path_buf(),
    )
}

#[test]
fn test_same_relative_root_from_two_directories() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    working_copy(first.path());
    working_copy(second.path());

    let cache = Arc::new(Cache::open(CacheConfig::new(cache_dir.path())).unwrap());
    let original = std::env::current_dir().unwrap();

    let (first_author, first_root) = author_via_relative_root(first.path(), &cache);
    let (second_author, second_root) = author_via_relative_root(second.path(), &cache);
    std::env::set_current_dir(original).unwrap();

    assert!(first_root.is_absolute());
    assert!(second_root.is_absolute());
    assert_ne!(first_root, second_root);

    let expected = |dir: &TempDir| {
        std::fs::canonicalize(dir.path().join("wc"))
            .unwrap()
            .display()
            .to_string()
    };
    assert_eq!(first_author, expected(&first));
    assert_eq!(second_author, expected(&second));
}
