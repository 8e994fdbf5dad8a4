//! Git through the `git` command line.
//!
//! Every command runs hardened:
//! - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
//! - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
//! - `core.hooksPath=` - disable hooks execution

use std::collections::HashMap;
use std::path::Path;

use super::{
    Backend, BackendKind, Target, VersionOrder, source_error, split_records, strip_diff_prefix,
    validate_version,
};
use crate::diff::{self, FileDiff};
use crate::error::{Result, VcsError};
use crate::process::Process;
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

const FIELD: char = '\x1f';
const RECORD: char = '\x1e';

/// `git log` format: hash, author, author time, raw message.
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%at%x1f%B%x1e";

#[derive(Debug, Clone)]
pub struct GitBackend {
    git_path: String,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GitBackend {
    /// Use the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    fn command(&self, root: &Path) -> Process {
        Process::new(&self.git_path)
            .env("GIT_LFS_SKIP_SMUDGE", "1")
            .env("GIT_TERMINAL_PROMPT", "0")
            .args(["-c", "core.hooksPath="])
            .current_dir(root)
    }

    fn head(&self, root: &Path) -> Result<String> {
        let output = self.command(root).args(["rev-parse", "HEAD"]).run()?;
        Ok(output.stdout_string().trim().to_string())
    }

    /// Leave a detached HEAD (from an earlier update to a fixed version) for
    /// the remote's default branch, so that `pull` has something to merge into.
    fn ensure_on_branch(&self, root: &Path) -> Result<()> {
        let on_branch = self
            .command(root)
            .args(["symbolic-ref", "-q", "HEAD"])
            .no_fail()
            .run()?
            .success();
        if on_branch {
            return Ok(());
        }

        let output = self
            .command(root)
            .args(["rev-parse", "--abbrev-ref", "origin/HEAD"])
            .run()?;
        let remote_head = output.stdout_string();
        let branch = remote_head
            .trim()
            .strip_prefix("origin/")
            .unwrap_or(remote_head.trim())
            .to_string();
        validate_version(&branch)?;
        self.command(root).args(["checkout", "-q"]).arg(&branch).run()?;
        Ok(())
    }
}

impl Backend for GitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Git
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::LogPosition
    }

    fn initialize(&self, root: &Path, source: &str) -> Result<()> {
        self.command(root)
            .args(["clone", "-q", "--"])
            .arg(source)
            .arg(".")
            .run()
            .map_err(|e| source_error(self.kind(), source, e.into()))?;
        Ok(())
    }

    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool> {
        let before = self.head(root)?;
        match version {
            None => {
                self.ensure_on_branch(root)?;
                self.command(root).args(["pull", "-q", "--ff-only"]).run()?;
            }
            Some(version) => {
                self.command(root)
                    .args(["checkout", "-q"])
                    .arg(version)
                    .run()?;
            }
        }
        let after = self.head(root)?;
        Ok(before != after)
    }

    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo> {
        let output = self
            .command(target.root)
            .args(["log", "-1", "--format=%H%x1f%an", "--"])
            .arg(target.relative())
            .run()?;
        parse_info(&output.stdout_string())
            .ok_or_else(|| VcsError::FileNotFound(target.path.to_string()))
    }

    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .args(["log", "--reverse", "--topo-order", LOG_FORMAT])
            .arg(version)
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_log(&output.stdout_string())
    }

    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>> {
        validate_version(from)?;
        validate_version(to)?;
        let output = self
            .command(target.root)
            .args(["diff", "--no-color", "--no-ext-diff"])
            .arg(from)
            .arg(to)
            .arg("--")
            .arg(target.relative())
            .run()?;
        let diff = diff::parse_str(&output.stdout_string())?;
        Ok(diff
            .into_iter()
            .map(|file| {
                let from = strip_diff_prefix(&file.from, "a/");
                let to = strip_diff_prefix(&file.to, "b/");
                FileDiff { from, to, ..file }
            })
            .collect())
    }

    fn cat(&self, target: &Target<'_>, version: &str) -> Result<Vec<u8>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .arg("show")
            .arg(format!("{version}:{}", target.relative()))
            .run()?;
        Ok(output.stdout)
    }

    fn blame(
        &self,
        target: &Target<'_>,
        version: &str,
        _log: &Log,
    ) -> Result<Option<Vec<BlameLine>>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .args(["blame", "--porcelain"])
            .arg(version)
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_blame(&output.stdout_string()).map(Some)
    }
}

fn parse_info(output: &str) -> Option<ResourceInfo> {
    let line = output.lines().next()?;
    let (version, author) = line.split_once(FIELD)?;
    if version.is_empty() {
        return None;
    }
    Some(ResourceInfo {
        version: version.to_string(),
        author: author.to_string(),
    })
}

fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    split_records(output, RECORD)
        .map(|record| {
            let mut fields = record.splitn(4, FIELD);
            let (Some(version), Some(author), Some(time), Some(message)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(VcsError::parse(format!("git log record: {record:?}")));
            };
            let timestamp = time
                .trim()
                .parse()
                .map_err(|_| VcsError::parse(format!("git log timestamp: {time:?}")))?;
            Ok(LogEntry::new(version.trim(), author, message, timestamp))
        })
        .collect()
}

/// Parse `git blame --porcelain`. Commit details are only printed the first
/// time a commit appears, so they are remembered by hash.
fn parse_blame(output: &str) -> Result<Vec<BlameLine>> {
    let mut commits: HashMap<String, (String, i64)> = HashMap::new();
    let mut current: Option<String> = None;
    let mut lines = Vec::new();

    for line in output.lines() {
        if let Some(content) = line.strip_prefix('\t') {
            let version = current
                .take()
                .ok_or_else(|| VcsError::parse("git blame: content before header"))?;
            let (author, timestamp) = commits.get(&version).cloned().unwrap_or_default();
            lines.push(BlameLine::new(content, version, author, timestamp));
        } else if current.is_none() {
            let hash = line
                .split_whitespace()
                .next()
                .filter(|h| h.len() >= 40 && h.bytes().all(|b| b.is_ascii_hexdigit()))
                .ok_or_else(|| VcsError::parse(format!("git blame header: {line:?}")))?;
            commits.entry(hash.to_string()).or_default();
            current = Some(hash.to_string());
        } else if let Some(hash) = &current {
            let entry = commits.entry(hash.clone()).or_default();
            if let Some(author) = line.strip_prefix("author ") {
                entry.0 = author.to_string();
            } else if let Some(time) = line.strip_prefix("author-time ") {
                entry.1 = time.trim().parse().unwrap_or_default();
            }
        }
    }

    Ok(lines)
}
