//! Read-only, uniform access to Git, Subversion, Mercurial, Bazaar and CVS
//! working copies.
//!
//! A [`Checkout`] binds a local working copy to a [`Backend`]; files and
//! directories inside it answer version, author, log, diff and blame
//! questions the same way whatever VCS is underneath. Answers are memoised
//! in a size-bounded [`Cache`] shared by all checkouts.

pub mod backend;
pub mod cache;
pub mod checkout;
pub mod diff;
pub mod error;
pub mod process;
pub mod resource;
pub mod types;

pub use backend::{Backend, BackendKind, SvnOptions, VersionOrder};
pub use cache::{Cache, CacheConfig, CacheError, CleanupStats};
pub use checkout::{Checkout, Entry};
pub use diff::{Chunk, DiffParseError, FileDiff, Line, LineType};
pub use error::{Result, VcsError};
pub use resource::{
    Authored, Blameable, Diffable, Directory, Fetchable, File, Logged, Node, Resource, Versioned,
};
pub use types::{BlameLine, Log, LogEntry, ResourceInfo};
