//! CVS through the `cvs` command line.
//!
//! CVS versions files, not trees: every file has its own RCS revision and
//! directories have no history at all. Checkout sources are written
//! `<cvsroot>#<module>[#<tag or revision>]`.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::{Backend, BackendKind, Target, VersionOrder, source_error, validate_version};
use crate::diff::{self, FileDiff};
use crate::error::{Result, VcsError};
use crate::process::Process;
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

/// Separator between revisions in `cvs log`.
const REVISION_SEPARATOR: &str = "----------------------------";
/// Terminator after the last revision of a file in `cvs log`.
const FILE_TERMINATOR: &str = "=============";

/// Pseudo version moving a checkout back to the trunk head (`update -A`).
const HEAD: &str = "HEAD";

/// Parsed `<cvsroot>#<module>[#<tag>]` checkout source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator<'a> {
    pub repository: &'a str,
    pub module: &'a str,
    pub tag: Option<&'a str>,
}

impl<'a> Locator<'a> {
    pub fn parse(source: &'a str) -> Result<Self> {
        let mut parts = source.splitn(3, '#');
        let repository = parts.next().unwrap_or_default();
        let module = parts.next().unwrap_or_default();
        let tag = parts.next().filter(|t| !t.is_empty());

        if repository.is_empty() || module.is_empty() {
            return Err(VcsError::InvalidInput(format!(
                "cvs source must be <cvsroot>#<module>[#<tag>]: {source}"
            )));
        }
        validate_version(repository)?;
        validate_version(module)?;
        if let Some(tag) = tag {
            validate_version(tag)?;
        }

        Ok(Self {
            repository,
            module,
            tag,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CvsBackend;

impl CvsBackend {
    pub fn new() -> Self {
        Self
    }

    /// `-f` skips `~/.cvsrc`, `-Q` silences the per-directory chatter on stderr.
    fn command(&self, root: &Path) -> Process {
        Process::new("cvs").args(["-f", "-Q"]).current_dir(root)
    }

    fn require_file(&self, target: &Target<'_>, operation: &str) -> Result<()> {
        if target.is_dir() {
            return Err(VcsError::unsupported(
                self.kind().name(),
                format!("{operation} of directories"),
            ));
        }
        Ok(())
    }

    fn full_log(&self, target: &Target<'_>) -> Result<Vec<LogEntry>> {
        let output = self
            .command(target.root)
            .arg("log")
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_log(&output.stdout_string())
    }
}

impl Backend for CvsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cvs
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::Dotted
    }

    fn initialize(&self, root: &Path, source: &str) -> Result<()> {
        let locator = Locator::parse(source)?;
        let (Some(parent), Some(name)) = (root.parent(), root.file_name()) else {
            return Err(VcsError::InvalidInput(format!(
                "cannot check out into {}",
                root.display()
            )));
        };

        let mut process = Process::new("cvs")
            .args(["-f", "-Q", "-d", locator.repository, "checkout"])
            .current_dir(parent);
        if let Some(tag) = locator.tag {
            process = process.arg("-r").arg(tag);
        }
        process
            .arg("-d")
            .arg(name)
            .arg(locator.module)
            .run()
            .map_err(|e| source_error(self.kind(), source, e.into()))?;
        Ok(())
    }

    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool> {
        let mut process = Process::new("cvs")
            .args(["-f", "-q", "update", "-dP"])
            .current_dir(root);
        process = match version {
            None | Some(HEAD) => process.arg("-A"),
            Some(version) => process.arg("-r").arg(version),
        };
        let output = process.run()?;
        Ok(update_changed(&output.stdout_string(), &output.stderr))
    }

    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo> {
        self.require_file(target, "version info")?;
        let output = self
            .command(target.root)
            .arg("status")
            .arg("--")
            .arg(target.relative())
            .run()?;
        let version = parse_status(&output.stdout_string())
            .ok_or_else(|| VcsError::FileNotFound(target.path.to_string()))?;

        let author = self
            .full_log(target)?
            .into_iter()
            .find(|entry| entry.version == version)
            .map(|entry| entry.author)
            .unwrap_or_default();
        Ok(ResourceInfo { version, author })
    }

    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>> {
        self.require_file(target, "history")?;
        validate_version(version)?;
        let order = self.version_order();
        let mut entries: Vec<LogEntry> = self
            .full_log(target)?
            .into_iter()
            .filter(|entry| {
                matches!(
                    order.compare_intrinsic(&entry.version, version),
                    Some(Ordering::Less | Ordering::Equal)
                )
            })
            .collect();
        entries.sort_by(|a, b| {
            order
                .compare_intrinsic(&a.version, &b.version)
                .unwrap_or(Ordering::Equal)
        });
        Ok(entries)
    }

    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>> {
        self.require_file(target, "diff")?;
        validate_version(from)?;
        validate_version(to)?;
        let output = self
            .command(target.root)
            .args(["diff", "-u"])
            .arg(format!("-r{from}"))
            .arg(format!("-r{to}"))
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
            .args(["update", "-p"])
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
            .arg("annotate")
            .arg(format!("-r{version}"))
            .arg("--")
            .arg(target.relative())
            .run()?;
        parse_annotate(&output.stdout_string(), log).map(Some)
    }
}

static STATUS_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Working revision:\s+(\d+(?:\.\d+)+)").unwrap());

static UPDATE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[UP] \S").unwrap());

static ANNOTATE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+\((\S+)\s+(\S+)\):\s?(.*)$").unwrap());

/// Working revision from `cvs status`; `None` for files unknown to CVS.
fn parse_status(output: &str) -> Option<String> {
    STATUS_REVISION
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// `cvs update` reports fetched files as `U file` or `P file`, and files
/// removed upstream on stderr.
fn update_changed(stdout: &str, stderr: &str) -> bool {
    UPDATE_LINE.is_match(stdout) || stderr.contains("is no longer in the repository")
}

/// Both log date formats: `2008/11/27 16:47:26` (UTC, CVS before 1.12) and
/// `2008-11-27 16:47:26 +0000`.
fn parse_log_date(text: &str) -> Result<i64> {
    let text = text.trim();
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z")
        .map(|date| date.timestamp())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M:%S")
                .map(|date| date.and_utc().timestamp())
        })
        .map_err(|_| VcsError::parse(format!("cvs log date: {text:?}")))
}

/// Parse the revision blocks of `cvs log` for a single file, newest first as
/// printed.
fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    let mut entries: Vec<LogEntry> = Vec::new();

    for block in output.split(REVISION_SEPARATOR).skip(1) {
        let block = match block.find(FILE_TERMINATOR) {
            Some(end) => &block[..end],
            None => block,
        };
        let mut lines = block.trim_start_matches(['\r', '\n']).lines();

        let Some(version) = lines
            .next()
            .and_then(|l| l.strip_prefix("revision "))
            .and_then(|l| l.split_whitespace().next())
        else {
            // A separator line inside a commit message.
            if let Some(entry) = entries.last_mut() {
                entry.message.push('\n');
                entry.message.push_str(REVISION_SEPARATOR);
                entry.message.push_str(block.trim_end());
            }
            continue;
        };

        let meta = lines
            .next()
            .ok_or_else(|| VcsError::parse(format!("cvs log revision {version}")))?;
        let mut date = None;
        let mut author = "";
        for field in meta.split(';') {
            match field.trim().split_once(':') {
                Some(("date", value)) => date = Some(parse_log_date(value)?),
                Some(("author", value)) => author = value.trim(),
                _ => {}
            }
        }

        let message: Vec<&str> = lines
            .skip_while(|l| l.starts_with("branches:"))
            .collect();
        let message = message.join("\n");

        entries.push(LogEntry::new(
            version,
            author,
            message.trim_end(),
            date.ok_or_else(|| VcsError::parse(format!("cvs log revision {version}: no date")))?,
        ));
    }

    Ok(entries)
}

/// Parse `cvs annotate`: `<revision> (<author> <dd-Mon-yy>): <line>`. The log
/// gives the exact commit time; the day stamp is the fallback.
fn parse_annotate(output: &str, log: &Log) -> Result<Vec<BlameLine>> {
    output
        .lines()
        .filter_map(|line| ANNOTATE_LINE.captures(line))
        .map(|caps| {
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
    NaiveDate::parse_from_str(day, "%d-%b-%y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc().timestamp())
        .ok_or_else(|| VcsError::parse(format!("cvs annotate date: {day:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "
RCS file: /tmp/cvs/cvs/dir1/file,v
Working file: dir1/file
head: 1.3
branch:
locks: strict
access list:
symbolic names:
\tmilestone: 1.2
keyword substitution: kv
total revisions: 3;\tselected revisions: 3
description:
----------------------------
revision 1.3
date: 2008/11/27 16:47:26;  author: manu;  state: Exp;  lines: +1 -0
- Test file modified.
----------------------------
revision 1.2
date: 2008-11-27 16:44:22 +0000;  author: manu;  state: Exp;  lines: +1 -0;  commitid: 100492ecdc6c4567;
branches:  1.2.2;
- A
----------------------------
revision 1.1
date: 2008/11/24 06:23:53;  author: manu;  state: Exp;
- Added file in subdir
=============================================================================
";

    #[test]
    fn test_locator() {
        assert_eq!(
            Locator::parse("/tmp/cvs#cvs#milestone").unwrap(),
            Locator {
                repository: "/tmp/cvs",
                module: "cvs",
                tag: Some("milestone"),
            }
        );
        assert_eq!(Locator::parse(":pserver:anon@host:/cvs#mod").unwrap().tag, None);
        assert!(Locator::parse("/tmp/cvs").is_err());
        assert!(Locator::parse("/tmp/cvs#").is_err());
        assert!(Locator::parse("/tmp/cvs#-rfoo").is_err());
    }

    #[test]
    fn test_parse_log_both_date_formats() {
        let log = parse_log(LOG).unwrap();
        assert_eq!(
            log,
            vec![
                LogEntry::new("1.3", "manu", "- Test file modified.", 1227804446),
                LogEntry::new("1.2", "manu", "- A", 1227804262),
                LogEntry::new("1.1", "manu", "- Added file in subdir", 1227507833),
            ]
        );
    }

    #[test]
    fn test_parse_log_without_revisions() {
        assert!(parse_log("RCS file: x,v\ndescription:\n=====\n").unwrap().is_empty());
        assert!(parse_log("----------------------------\nrevision 1.1\n").is_err());
    }

    #[test]
    fn test_parse_status() {
        let output = "\
===================================================================
File: file             \tStatus: Up-to-date

   Working revision:\t1.2\tMon Nov 24 06:26:01 2008
   Repository revision:\t1.2\t/tmp/cvs/cvs/file,v
";
        assert_eq!(parse_status(output).as_deref(), Some("1.2"));
        assert_eq!(parse_status("   Working revision:\tNo entry for file\n"), None);
    }

    #[test]
    fn test_update_changed() {
        assert!(!update_changed("", ""));
        assert!(!update_changed("? stray.txt\n", ""));
        assert!(update_changed("U foo.txt\n", ""));
        assert!(update_changed("P dir1/file\n", ""));
        assert!(update_changed("", "cvs update: `dir1/file' is no longer in the repository\n"));
    }

    #[test]
    fn test_parse_annotate() {
        let output = "\
1.1          (manu     24-Nov-08): Some test contents
1.2          (manu     27-Nov-08): More test contents
1.3          (manu     27-Nov-08): And another test line
";
        let log = Log::new(parse_log(LOG).unwrap());
        let blame = parse_annotate(output, &log).unwrap();
        assert_eq!(
            blame,
            vec![
                BlameLine::new("Some test contents", "1.1", "manu", 1227507833),
                BlameLine::new("More test contents", "1.2", "manu", 1227804262),
                BlameLine::new("And another test line", "1.3", "manu", 1227804446),
            ]
        );

        let blame = parse_annotate("1.4 (kore 28-Nov-08): \n", &log).unwrap();
        assert_eq!(blame[0].content, "");
        assert_eq!(blame[0].timestamp, 1227830400);
    }

    #[test]
    fn test_directory_history_is_unsupported() {
        let backend = CvsBackend::new();
        let target = Target::new(Path::new("/wc"), "/dir1/");
        assert!(matches!(
            backend.log(&target, "1.1"),
            Err(VcsError::Unsupported { .. })
        ));
        assert!(matches!(
            backend.info(&target),
            Err(VcsError::Unsupported { .. })
        ));
    }
}
