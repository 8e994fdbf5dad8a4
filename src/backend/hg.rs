//! Mercurial through the `hg` command line.
//!
//! Runs with `HGPLAIN=1` so user configuration and localisation never change
//! the output, and reads log data through a template with `0x1f`/`0x1e`
//! separators.

use std::path::Path;

use super::{
    Backend, BackendKind, Target, VersionOrder, source_error, split_records, strip_diff_prefix,
    timestamp_for, validate_version,
};
use crate::diff::{self, FileDiff};
use crate::error::{Result, VcsError};
use crate::process::Process;
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

const FIELD: char = '\x1f';
const RECORD: char = '\x1e';

const INFO_TEMPLATE: &str = "{node}\x1f{author}\n";
const LOG_TEMPLATE: &str = "{node}\x1f{author}\x1f{date|hgdate}\x1f{desc}\x1e";

#[derive(Debug, Clone, Default)]
pub struct HgBackend;

impl HgBackend {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, root: &Path) -> Process {
        Process::new("hg")
            .env("HGPLAIN", "1")
            .arg("-y")
            .current_dir(root)
    }

    fn identify(&self, root: &Path) -> Result<String> {
        let output = self.command(root).args(["id", "-i"]).run()?;
        Ok(output.stdout_string().trim().to_string())
    }
}

impl Backend for HgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hg
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::LogPosition
    }

    fn initialize(&self, root: &Path, source: &str) -> Result<()> {
        self.command(root)
            .arg("clone")
            .arg(source)
            .arg(root)
            .run()
            .map_err(|e| source_error(self.kind(), source, e.into()))?;
        Ok(())
    }

    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool> {
        let before = self.identify(root)?;
        match version {
            None => {
                self.command(root).arg("pull").run()?;
                self.command(root).arg("update").run()?;
            }
            Some(version) => {
                self.command(root).args(["update", "-r"]).arg(version).run()?;
            }
        }
        Ok(before != self.identify(root)?)
    }

    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo> {
        let output = self
            .command(target.root)
            .args(["log", "-l", "1", "-r", "reverse(::.)", "--template", INFO_TEMPLATE, "--"])
            .arg(target.relative())
            .run()?;
        parse_info(&output.stdout_string())
            .ok_or_else(|| VcsError::FileNotFound(target.path.to_string()))
    }

    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .args(["log", "-r"])
            .arg(format!("::{version}"))
            .args(["--template", LOG_TEMPLATE, "--"])
            .arg(target.relative())
            .run()?;
        parse_log(&output.stdout_string())
    }

    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>> {
        validate_version(from)?;
        validate_version(to)?;
        let output = self
            .command(target.root)
            .args(["diff", "--git", "-r"])
            .arg(from)
            .arg("-r")
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
            .args(["cat", "-r"])
            .arg(version)
            .arg("--")
            .arg(target.relative())
            .run()?;
        Ok(output.stdout)
    }

    fn blame(
        &self,
        target: &Target<'_>,
        version: &str,
        log: &Log,
    ) -> Result<Option<Vec<BlameLine>>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .args(["annotate", "--changeset", "-r"])
            .arg(version)
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_annotate(&output.stdout_string(), log).map(Some)
    }
}

fn parse_info(output: &str) -> Option<ResourceInfo> {
    let (version, author) = output.lines().next()?.split_once(FIELD)?;
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
            let (Some(version), Some(author), Some(date), Some(message)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(VcsError::parse(format!("hg log record: {record:?}")));
            };
            // hgdate is "<unix time> <tz offset>"
            let timestamp = date
                .split_whitespace()
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| VcsError::parse(format!("hg date: {date:?}")))?;
            Ok(LogEntry::new(version.trim(), author, message, timestamp))
        })
        .collect()
}

/// Parse `hg annotate --changeset` (`<short hash>: <line>`), resolving short
/// hashes against the file's log.
fn parse_annotate(output: &str, log: &Log) -> Result<Vec<BlameLine>> {
    output
        .lines()
        .map(|line| {
            let (short, content) = line
                .split_once(": ")
                .or_else(|| line.strip_suffix(':').map(|s| (s, "")))
                .ok_or_else(|| VcsError::parse(format!("hg annotate line: {line:?}")))?;
            let short = short.trim();
            let entry = log
                .iter()
                .find(|e| e.version.starts_with(short))
                .ok_or_else(|| VcsError::parse(format!("hg annotate: unknown changeset {short}")))?;
            Ok(BlameLine::new(
                content,
                entry.version.as_str(),
                entry.author.as_str(),
                timestamp_for(log, &entry.version),
            ))
        })
        .collect()
}
