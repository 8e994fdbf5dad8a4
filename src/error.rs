use thiserror::Error;

use crate::cache::CacheError;
use crate::diff::DiffParseError;
use crate::process::ProcessError;

/// Errors returned by resources, checkouts and backends.
#[derive(Error, Debug)]
pub enum VcsError {
    /// The requested version is not part of the resource's history.
    #[error("no such version {version} for {path}")]
    NoSuchVersion { path: String, version: String },

    /// The path is not part of the checkout (including escapes above the root).
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The directory is not a working copy of the expected backend.
    #[error("not a {backend} working copy: {path}")]
    RepositoryNotFound { backend: String, path: String },

    /// The backend cannot express this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: String,
        operation: String,
    },

    /// External command failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Metadata cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Diff output was malformed.
    #[error(transparent)]
    DiffParse(#[from] DiffParseError),

    /// A version or locator that cannot be passed to the VCS tool.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Log, blame or info output was malformed.
    #[error("failed to parse {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn no_such_version(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self::NoSuchVersion {
            path: path.into(),
            version: version.into(),
        }
    }

    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    pub fn parse(what: impl Into<String>) -> Self {
        Self::Parse(what.into())
    }

    /// True for errors meaning "this does not exist", as opposed to a tool or
    /// storage failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchVersion { .. } | Self::FileNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;
