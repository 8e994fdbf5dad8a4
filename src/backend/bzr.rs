//! Bazaar through the `bzr` command line.
//!
//! Versions are mainline revision numbers. History comes from
//! `bzr log --long -n1`, which prints one dash-separated block per revision.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use super::{Backend, BackendKind, Target, VersionOrder, source_error, validate_version};
use crate::diff::{self, FileDiff};
use crate::error::{Result, VcsError};
use crate::process::Process;
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

const TIMESTAMP_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S %z";

#[derive(Debug, Clone, Default)]
pub struct BzrBackend;

impl BzrBackend {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, root: &Path) -> Process {
        Process::new("bzr").current_dir(root)
    }

    fn revno(&self, root: &Path) -> Result<String> {
        let output = self.command(root).args(["revno", "--tree"]).run()?;
        Ok(output.stdout_string().trim().to_string())
    }

    fn run_log(&self, target: &Target<'_>, range: &[String]) -> Result<Vec<LogEntry>> {
        let output = self
            .command(target.root)
            .args(["log", "--long", "-n1"])
            .args(range)
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_log(&output.stdout_string())
    }
}

impl Backend for BzrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bzr
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::Numeric
    }

    fn initialize(&self, root: &Path, source: &str) -> Result<()> {
        let (Some(parent), Some(name)) = (root.parent(), root.file_name()) else {
            return Err(VcsError::InvalidInput(format!(
                "cannot check out into {}",
                root.display()
            )));
        };
        // bzr wants to create the checkout directory itself.
        if root.is_dir() && std::fs::read_dir(root)?.next().is_none() {
            std::fs::remove_dir(root)?;
        }

        self.command(parent)
            .args(["checkout", "-q"])
            .arg(source)
            .arg(name)
            .run()
            .map_err(|e| source_error(self.kind(), source, e.into()))?;
        Ok(())
    }

    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool> {
        let before = self.revno(root)?;
        let mut process = self.command(root).args(["update", "-q"]);
        if let Some(version) = version {
            process = process.arg("-r").arg(version);
        }
        process.run()?;
        Ok(before != self.revno(root)?)
    }

    /// Last revision touching `target` at or below the tree's revision,
    /// which trails the branch tip after `update -r`.
    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo> {
        let tree = self.revno(target.root)?;
        let range = ["-l1".to_string(), format!("-r1..{tree}")];
        let latest = self
            .run_log(target, &range)?
            .into_iter()
            .next()
            .ok_or_else(|| VcsError::FileNotFound(target.path.to_string()))?;
        Ok(ResourceInfo {
            version: latest.version,
            author: latest.author,
        })
    }

    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>> {
        validate_version(version)?;
        self.run_log(target, &["--forward".to_string(), format!("-r1..{version}")])
    }

    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>> {
        validate_version(from)?;
        validate_version(to)?;
        let output = self
            .command(target.root)
            .arg("diff")
            .arg(format!("-r{from}..{to}"))
            .arg("--")
            .arg(target.relative())
            .allow_exit_codes(&[1])
            .run()?;
        Ok(diff::parse_str(&output.stdout_string())?)
    }

    fn cat(&self, target: &Target<'_>, version: &str) -> Result<Vec<u8>> {
        validate_version(version)?;
        let output = self
            .command(target.root)
            .arg("cat")
            .arg(format!("-r{version}"))
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
            .args(["annotate", "--long", "--all"])
            .arg(format!("-r{version}"))
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_annotate(&output.stdout_string(), log).map(Some)
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    line.len() > 10 && line.bytes().all(|b| b == b'-')
}

/// Parse `bzr log --long` blocks. The author line wins over the committer
/// when both are present.
fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in output.lines() {
        if is_separator(line) {
            if let Some(entry) = parse_block(&block)? {
                entries.push(entry);
            }
            block.clear();
        } else {
            block.push(line);
        }
    }
    if let Some(entry) = parse_block(&block)? {
        entries.push(entry);
    }

    Ok(entries)
}

fn parse_block(lines: &[&str]) -> Result<Option<LogEntry>> {
    let mut revno = None;
    let mut author = None;
    let mut committer = None;
    let mut timestamp = None;
    let mut message: Vec<&str> = Vec::new();
    let mut in_message = false;

    for line in lines {
        if in_message {
            message.push(line.strip_prefix("  ").unwrap_or(line));
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "revno" => revno = value.split_whitespace().next(),
            "author" => author = Some(value),
            "committer" => committer = Some(value),
            "timestamp" => {
                let date = DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
                    .map_err(|_| VcsError::parse(format!("bzr timestamp: {value:?}")))?;
                timestamp = Some(date.timestamp());
            }
            "message" => in_message = true,
            _ => {}
        }
    }

    let Some(revno) = revno else {
        if lines.iter().any(|l| !l.trim().is_empty()) {
            return Err(VcsError::parse("bzr log block without revno"));
        }
        return Ok(None);
    };
    while message.last().is_some_and(|l| l.trim().is_empty()) {
        message.pop();
    }

    Ok(Some(LogEntry::new(
        revno,
        author.or(committer).unwrap_or_default(),
        message.join("\n"),
        timestamp.unwrap_or_default(),
    )))
}

static ANNOTATE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)*)\??\*?\s+(\S+)\s+(\d{8}) \| ?(.*)$").unwrap()
});

/// Parse `bzr annotate --long --all`: `<revno> <author> <yyyymmdd> | <line>`.
/// The log gives the exact commit time; the day stamp is the fallback.
fn parse_annotate(output: &str, log: &Log) -> Result<Vec<BlameLine>> {
    output
        .lines()
        .map(|line| {
            let caps = ANNOTATE_LINE
                .captures(line)
                .ok_or_else(|| VcsError::parse(format!("bzr annotate line: {line:?}")))?;
            let version = &caps[1];
            let timestamp = match log.get(version) {
                Some(entry) => entry.timestamp,
                None => day_timestamp(&caps[3])?,
            };
            Ok(BlameLine::new(&caps[4], version, &caps[2], timestamp))
        })
        .collect()
}

fn day_timestamp(day: &str) -> Result<i64> {
    NaiveDate::parse_from_str(day, "%Y%m%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc().timestamp())
        .ok_or_else(|| VcsError::parse(format!("bzr annotate date: {day:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
------------------------------------------------------------
revno: 1
committer: richard <richard@shaoden>
branch nick: bzr
timestamp: Mon 2010-06-14 17:58:55 -0600
message:
  Initial commit
------------------------------------------------------------
revno: 2
author: Richard Bateman <taxilian@gmail.com>
committer: richard <richard@shaoden>
branch nick: bzr
timestamp: Mon 2010-06-14 19:01:52 -0600
message:
  Added a new line
";

    #[test]
    fn test_parse_log() {
        let log = parse_log(LOG).unwrap();
        assert_eq!(
            log,
            vec![
                LogEntry::new("1", "richard <richard@shaoden>", "Initial commit", 1276559935),
                LogEntry::new(
                    "2",
                    "Richard Bateman <taxilian@gmail.com>",
                    "Added a new line",
                    1276563712
                ),
            ]
        );
    }

    #[test]
    fn test_parse_log_multiline_message_and_merge_marker() {
        let output = "\
------------------------------------------------------------
revno: 7 [merge]
committer: kore
timestamp: Tue 2010-06-15 10:00:00 +0000
message:
  Merged feature

  With details: see below
";
        let log = parse_log(output).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].version, "7");
        assert_eq!(log[0].author, "kore");
        assert_eq!(log[0].message, "Merged feature\n\nWith details: see below");
    }

    #[test]
    fn test_parse_log_empty_and_broken() {
        assert!(parse_log("").unwrap().is_empty());
        assert!(parse_log("------------------------------\ncommitter: x\n").is_err());
        assert!(parse_log("revno: 1\ntimestamp: yesterday\n").is_err());
    }

    #[test]
    fn test_parse_annotate() {
        let output = "\
1   richard@shaoden 20100614 | Some test file
1   richard@shaoden 20100614 | Another line in the file
2   taxilian@gmail.com 20100614 | Added a new line
";
        let log = Log::new(parse_log(LOG).unwrap());
        let blame = parse_annotate(output, &log).unwrap();
        assert_eq!(
            blame,
            vec![
                BlameLine::new("Some test file", "1", "richard@shaoden", 1276559935),
                BlameLine::new("Another line in the file", "1", "richard@shaoden", 1276559935),
                BlameLine::new("Added a new line", "2", "taxilian@gmail.com", 1276563712),
            ]
        );
    }

    #[test]
    fn test_parse_annotate_outside_log_uses_day() {
        let blame = parse_annotate("3?  kore 20100616 | \n", &Log::default()).unwrap();
        assert_eq!(blame[0].version, "3");
        assert_eq!(blame[0].content, "");
        assert_eq!(blame[0].timestamp, 1276646400);
    }
}
