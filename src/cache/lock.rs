//! Cross-process guard around eviction.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

/// Exclusive hold on the cleanup lock file for one eviction pass.
///
/// The flock goes away with the file handle, so dropping the guard releases
/// it.
#[derive(Debug)]
pub struct EvictionGuard {
    _file: File,
}

impl EvictionGuard {
    /// Take the lock if nobody holds it. `Ok(None)` means another process is
    /// evicting right now and this pass can be skipped.
    pub fn try_hold(lock_path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hold_creates_lock_file() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("nested").join("cleanup.lock");

        let guard = EvictionGuard::try_hold(&lock_path).unwrap();
        assert!(guard.is_some());
        assert!(lock_path.exists());
    }

    #[test]
    fn test_second_holder_is_turned_away_until_drop() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("cleanup.lock");

        let first = EvictionGuard::try_hold(&lock_path).unwrap();
        assert!(first.is_some());
        assert!(EvictionGuard::try_hold(&lock_path).unwrap().is_none());

        drop(first);
        assert!(EvictionGuard::try_hold(&lock_path).unwrap().is_some());
    }
}
