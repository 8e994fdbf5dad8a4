//! Per-VCS strategies
//!
//! A [`Backend`] knows which commands to run for a working copy and how to
//! read their output. Everything else (laziness, caching, version checks,
//! path rewriting) lives in [`crate::resource`] and is shared by all of them.

pub mod bzr;
pub mod cvs;
pub mod git;
pub mod hg;
pub mod svn;

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::diff::FileDiff;
use crate::error::{Result, VcsError};
use crate::process::ProcessError;
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

pub use bzr::BzrBackend;
pub use cvs::CvsBackend;
pub use git::GitBackend;
pub use hg::HgBackend;
pub use svn::{SvnBackend, SvnOptions};

/// Supported version control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Git,
    Svn,
    Hg,
    Bzr,
    Cvs,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [Self::Git, Self::Svn, Self::Hg, Self::Bzr, Self::Cvs];

    pub fn name(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Svn => "svn",
            Self::Hg => "hg",
            Self::Bzr => "bzr",
            Self::Cvs => "cvs",
        }
    }

    /// Directory the VCS keeps its bookkeeping in, inside every working copy.
    pub fn metadata_dir(self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Svn => ".svn",
            Self::Hg => ".hg",
            Self::Bzr => ".bzr",
            Self::Cvs => "CVS",
        }
    }

    /// Guess the backend of an existing working copy from its metadata dir.
    pub fn detect(path: &Path) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| path.join(kind.metadata_dir()).is_dir())
            .ok_or_else(|| VcsError::RepositoryNotFound {
                backend: "supported".to_string(),
                path: path.display().to_string(),
            })
    }

    /// Strategy object with default options.
    pub fn backend(self) -> Arc<dyn Backend> {
        match self {
            Self::Git => Arc::new(GitBackend::new()),
            Self::Svn => Arc::new(SvnBackend::new(SvnOptions::default())),
            Self::Hg => Arc::new(HgBackend::new()),
            Self::Bzr => Arc::new(BzrBackend::new()),
            Self::Cvs => Arc::new(CvsBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "svn" | "subversion" => Ok(Self::Svn),
            "hg" | "mercurial" => Ok(Self::Hg),
            "bzr" | "bazaar" => Ok(Self::Bzr),
            "cvs" => Ok(Self::Cvs),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// How a backend's version strings are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    /// Integer revision numbers (svn, bzr).
    Numeric,
    /// Dotted RCS revisions such as `1.2.2.1` (cvs).
    Dotted,
    /// Opaque hashes ordered by their position in the resource's log (git, hg).
    LogPosition,
}

impl VersionOrder {
    /// Order two version strings without consulting history. Returns `None`
    /// when the strings are not valid for this order, or when the order
    /// needs the log.
    pub fn compare_intrinsic(self, a: &str, b: &str) -> Option<Ordering> {
        match self {
            Self::Numeric => Some(a.parse::<u64>().ok()?.cmp(&b.parse::<u64>().ok()?)),
            Self::Dotted => Some(parse_dotted(a)?.cmp(&parse_dotted(b)?)),
            Self::LogPosition => None,
        }
    }
}

fn parse_dotted(version: &str) -> Option<Vec<u64>> {
    version.split('.').map(|part| part.parse().ok()).collect()
}

/// A resource as the backend sees it.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub root: &'a Path,
    /// Root-relative path with a leading `/`; directories end in `/`.
    pub path: &'a str,
}

impl<'a> Target<'a> {
    pub fn new(root: &'a Path, path: &'a str) -> Self {
        Self { root, path }
    }

    /// Path relative to the root without leading or trailing slashes, `.` for
    /// the root itself.
    pub fn relative(&self) -> &'a str {
        let trimmed = self.path.trim_matches('/');
        if trimmed.is_empty() { "." } else { trimmed }
    }

    pub fn absolute(&self) -> PathBuf {
        match self.relative() {
            "." => self.root.to_path_buf(),
            rel => self.root.join(rel),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Final path component, empty for the root.
    pub fn file_name(&self) -> &'a str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Directory containing the target, relative to the root.
    pub fn parent_relative(&self) -> &'a str {
        match self.relative().rsplit_once('/') {
            Some((parent, _)) => parent,
            None => ".",
        }
    }
}

/// Commands and output grammar of one VCS.
///
/// Methods take the working-copy root and a root-relative target; they run
/// the VCS tool and return parsed data without caching.
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    fn metadata_dir(&self) -> &'static str {
        self.kind().metadata_dir()
    }

    fn version_order(&self) -> VersionOrder;

    /// First checkout of `source` into `root`.
    fn initialize(&self, root: &Path, source: &str) -> Result<()>;

    /// Pull upstream changes (`None`) or move to `version`. Returns whether
    /// the working copy changed.
    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool>;

    /// Version and author of the working copy state of `target`.
    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo>;

    /// History of `target` up to and including `version`, oldest first.
    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>>;

    /// Unified diff of `target` between two versions, paths as the tool
    /// printed them (prefixes such as `a/` removed).
    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>>;

    /// File content at `version`.
    fn cat(&self, target: &Target<'_>, version: &str) -> Result<Vec<u8>>;

    /// Per-line attribution at `version`, `None` when the tool cannot blame
    /// the file. `log` is the file's history up to `version`.
    fn blame(
        &self,
        target: &Target<'_>,
        version: &str,
        log: &Log,
    ) -> Result<Option<Vec<BlameLine>>>;

    /// Versioned property such as `mime-type`. Most backends have none.
    fn property(&self, target: &Target<'_>, version: &str, name: &str) -> Result<Option<String>> {
        let _ = (target, version, name);
        Ok(None)
    }
}

/// Reject version strings that the VCS tool could mistake for options.
///
/// Rejects empty strings, a leading `-`, and control characters.
pub(crate) fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(VcsError::InvalidInput("version cannot be empty".to_string()));
    }
    if version.starts_with('-') {
        return Err(VcsError::InvalidInput(format!(
            "version cannot start with '-': {version}"
        )));
    }
    if version.bytes().any(|b| b < 0x20) {
        return Err(VcsError::InvalidInput(
            "version cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// A clone or checkout that the tool refused means the source is not a
/// repository; other failures pass through.
pub(crate) fn source_error(kind: BackendKind, source: &str, err: VcsError) -> VcsError {
    match err {
        VcsError::Process(ProcessError::NonZeroExit { stderr, .. }) => {
            log::warn!("{kind} could not check out {source}: {stderr}");
            VcsError::RepositoryNotFound {
                backend: kind.to_string(),
                path: source.to_string(),
            }
        }
        other => other,
    }
}

/// Split templated output into records on `separator`, dropping the line
/// breaks the tool puts between records.
pub(crate) fn split_records(output: &str, separator: char) -> impl Iterator<Item = &str> {
    output
        .split(separator)
        .map(|record| record.trim_start_matches(['\r', '\n']))
        .filter(|record| !record.trim().is_empty())
}

/// Strip a one-component prefix such as `a/` or `b/` from a diff path.
pub(crate) fn strip_diff_prefix(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// Timestamp for a blamed line, taken from the matching log entry.
pub(crate) fn timestamp_for(log: &Log, version: &str) -> i64 {
    log.get(version).map(|e| e.timestamp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_numeric_order() {
        let order = VersionOrder::Numeric;
        assert_eq!(order.compare_intrinsic("2", "10"), Some(Ordering::Less));
        assert_eq!(order.compare_intrinsic("7", "7"), Some(Ordering::Equal));
        assert_eq!(order.compare_intrinsic("abc", "1"), None);
    }

    #[test]
    fn test_dotted_order() {
        let order = VersionOrder::Dotted;
        assert_eq!(order.compare_intrinsic("1.2", "1.10"), Some(Ordering::Less));
        assert_eq!(order.compare_intrinsic("1.2", "1.2.2.1"), Some(Ordering::Less));
        assert_eq!(order.compare_intrinsic("1.3", "1.2.2.1"), Some(Ordering::Greater));
        assert_eq!(order.compare_intrinsic("1.x", "1.1"), None);
    }

    #[test]
    fn test_log_position_needs_history() {
        assert_eq!(VersionOrder::LogPosition.compare_intrinsic("a", "b"), None);
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("2037a8d0").is_ok());
        assert!(validate_version("1.2.2.1").is_ok());
        assert!(validate_version("").is_err());
        assert!(validate_version("--upload-pack=evil").is_err());
        assert!(validate_version("a\nb").is_err());
    }

    #[test]
    fn test_split_records() {
        let output = "a\x1fb\x1e\nc\x1fd\n\x1e\n";
        let records: Vec<_> = split_records(output, '\x1e').collect();
        assert_eq!(records, vec!["a\x1fb", "c\x1fd\n"]);
    }

    #[test]
    fn test_source_error_maps_refused_checkout() {
        let err = VcsError::Process(ProcessError::NonZeroExit {
            command: "git clone".into(),
            code: 128,
            stderr: "fatal: repository not found".into(),
        });
        assert!(matches!(
            source_error(BackendKind::Git, "file:///nope", err),
            VcsError::RepositoryNotFound { .. }
        ));
    }

    #[test]
    fn test_target_paths() {
        let root = Path::new("/wc");
        let file = Target::new(root, "/dir1/file");
        assert_eq!(file.relative(), "dir1/file");
        assert_eq!(file.absolute(), PathBuf::from("/wc/dir1/file"));
        assert_eq!(file.file_name(), "file");
        assert_eq!(file.parent_relative(), "dir1");
        assert!(!file.is_dir());

        let dir = Target::new(root, "/dir1/");
        assert_eq!(dir.relative(), "dir1");
        assert!(dir.is_dir());
        assert_eq!(dir.file_name(), "dir1");

        let top = Target::new(root, "/");
        assert_eq!(top.relative(), ".");
        assert_eq!(top.absolute(), PathBuf::from("/wc"));
        assert_eq!(top.file_name(), "");
    }

    #[test]
    fn test_detect() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            BackendKind::detect(dir.path()),
            Err(VcsError::RepositoryNotFound { .. })
        ));

        std::fs::create_dir(dir.path().join(".hg")).unwrap();
        assert_eq!(BackendKind::detect(dir.path()).unwrap(), BackendKind::Hg);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Git".parse::<BackendKind>().unwrap(), BackendKind::Git);
        assert_eq!("subversion".parse::<BackendKind>().unwrap(), BackendKind::Svn);
        assert!("darcs".parse::<BackendKind>().is_err());
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
