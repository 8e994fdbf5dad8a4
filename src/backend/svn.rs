//! Subversion through the `svn` command line, reading its `--xml` output.

use std::path::Path;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use roxmltree::{Document, Node};

use super::{Backend, BackendKind, Target, VersionOrder, source_error, validate_version};
use crate::diff::{self, FileDiff};
use crate::error::{Result, VcsError};
use crate::process::{Process, ProcessError};
use crate::types::{BlameLine, Log, LogEntry, ResourceInfo};

/// Warning printed by `svn propget` when the property is not set.
const PROPERTY_NOT_FOUND: &str = "W200017";

/// Credentials passed to every `svn` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SvnOptions {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SvnBackend {
    options: SvnOptions,
}

impl SvnBackend {
    pub fn new(options: SvnOptions) -> Self {
        Self { options }
    }

    fn command(&self) -> Process {
        let mut process = Process::new("svn").arg("--non-interactive");
        if let Some(username) = &self.options.username {
            process = process.arg("--username").arg(username);
        }
        if let Some(password) = &self.options.password {
            process = process.arg("--password").arg(password);
        }
        process
    }
}

impl Backend for SvnBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Svn
    }

    fn version_order(&self) -> VersionOrder {
        VersionOrder::Numeric
    }

    fn initialize(&self, root: &Path, source: &str) -> Result<()> {
        self.command()
            .arg("checkout")
            .arg(source)
            .arg(root)
            .run()
            .map_err(|e| source_error(self.kind(), source, e.into()))?;
        Ok(())
    }

    fn update(&self, root: &Path, version: Option<&str>) -> Result<bool> {
        let mut process = self.command().arg("update");
        if let Some(version) = version {
            process = process.arg("-r").arg(version);
        }
        let output = process.arg(root).run()?;
        Ok(update_changed(&output.stdout_string()))
    }

    fn info(&self, target: &Target<'_>) -> Result<ResourceInfo> {
        let output = self
            .command()
            .args(["--xml", "info"])
            .arg(target.absolute())
            .run()?;
        parse_info(&output.stdout_string())
    }

    fn log(&self, target: &Target<'_>, version: &str) -> Result<Vec<LogEntry>> {
        validate_version(version)?;
        let output = self
            .command()
            .args(["--xml", "log"])
            .arg(format!("-r1:{version}"))
            .arg(target.absolute())
            .run()?;
        parse_log(&output.stdout_string())
    }

    fn diff(&self, target: &Target<'_>, from: &str, to: &str) -> Result<Vec<FileDiff>> {
        validate_version(from)?;
        validate_version(to)?;
        let output = self
            .command()
            .arg("diff")
            .arg(format!("-r{from}:{to}"))
            .arg(target.absolute())
            .run()?;
        Ok(diff::parse_str(&output.stdout_string())?)
    }

    fn cat(&self, target: &Target<'_>, version: &str) -> Result<Vec<u8>> {
        validate_version(version)?;
        let output = self
            .command()
            .arg("cat")
            .arg(format!("-r{version}"))
            .arg(target.absolute())
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
            .command()
            .args(["--xml", "blame"])
            .arg(format!("-r{version}"))
            .arg(target.absolute())
            .no_fail()
            .run()?;
        if !output.success() {
            if output.stderr.contains("binary") {
                log::debug!("svn refuses to blame binary {}", target.path);
                return Ok(None);
            }
            return Err(ProcessError::NonZeroExit {
                command: "svn blame".to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let content = String::from_utf8_lossy(&self.cat(target, version)?).into_owned();
        parse_blame(&output.stdout_string(), &content).map(Some)
    }

    fn property(&self, target: &Target<'_>, version: &str, name: &str) -> Result<Option<String>> {
        validate_version(version)?;
        let output = self
            .command()
            .arg("propget")
            .arg(format!("-r{version}"))
            .arg(format!("svn:{name}"))
            .arg(target.absolute())
            .no_fail()
            .run()?;
        if !output.success() {
            if output.stderr.contains(PROPERTY_NOT_FOUND) {
                return Ok(None);
            }
            return Err(ProcessError::NonZeroExit {
                command: "svn propget".to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let value = output.stdout_string().trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }
}

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[ADUCGER]| [ADUCGER])[ADUCGER ]{0,3}\s+\S").unwrap());

/// Whether `svn update` printed any item status line, such as `A    file`
/// or ` U   dir` (property change).
fn update_changed(output: &str) -> bool {
    output.lines().any(|line| STATUS_LINE.is_match(line))
}

fn xml_error(err: roxmltree::Error) -> VcsError {
    VcsError::parse(format!("svn xml output: {err}"))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> &'a str {
    node.children()
        .find(|c| c.has_tag_name(name))
        .and_then(|c| c.text())
        .unwrap_or_default()
}

fn parse_date(text: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|date| date.timestamp())
        .map_err(|_| VcsError::parse(format!("svn date: {text:?}")))
}

fn parse_info(xml: &str) -> Result<ResourceInfo> {
    let doc = Document::parse(xml).map_err(xml_error)?;
    let commit = doc
        .descendants()
        .find(|n| n.has_tag_name("commit"))
        .ok_or_else(|| VcsError::parse("svn info: no commit element"))?;
    let version = commit
        .attribute("revision")
        .ok_or_else(|| VcsError::parse("svn info: commit without revision"))?;

    Ok(ResourceInfo {
        version: version.to_string(),
        author: child_text(commit, "author").to_string(),
    })
}

fn parse_log(xml: &str) -> Result<Vec<LogEntry>> {
    let doc = Document::parse(xml).map_err(xml_error)?;
    let mut entries = doc
        .descendants()
        .filter(|n| n.has_tag_name("logentry"))
        .map(|entry| {
            let revision = entry
                .attribute("revision")
                .ok_or_else(|| VcsError::parse("svn log: entry without revision"))?;
            let date = child_text(entry, "date");
            let timestamp = if date.is_empty() { 0 } else { parse_date(date)? };
            Ok(LogEntry::new(
                revision,
                child_text(entry, "author"),
                child_text(entry, "msg"),
                timestamp,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by_key(|e| e.version.parse::<u64>().unwrap_or_default());
    Ok(entries)
}

/// `svn blame --xml` carries attribution only; the line text comes from the
/// file content at the same revision.
fn parse_blame(xml: &str, content: &str) -> Result<Vec<BlameLine>> {
    let doc = Document::parse(xml).map_err(xml_error)?;
    let mut lines = content.lines();

    doc.descendants()
        .filter(|n| n.has_tag_name("entry"))
        .map(|entry| {
            let text = lines.next().unwrap_or_default();
            let Some(commit) = entry.children().find(|c| c.has_tag_name("commit")) else {
                return Ok(BlameLine::new(text, "", "", 0));
            };
            let version = commit.attribute("revision").unwrap_or_default();
            let date = child_text(commit, "date");
            let timestamp = if date.is_empty() { 0 } else { parse_date(date)? };
            Ok(BlameLine::new(
                text,
                version,
                child_text(commit, "author"),
                timestamp,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<info>
<entry kind="file" path="/tmp/wc/file" revision="6">
<url>file:///tmp/svn/file</url>
<repository>
<root>file:///tmp/svn</root>
<uuid>a0c5a3a8-f2c7-4f27-a1ae-0d2e8b0a7c61</uuid>
</repository>
<commit revision="5">
<author>kore</author>
<date>2008-11-18T09:18:06.468347Z</date>
</commit>
</entry>
</info>
"#;

    const LOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log>
<logentry revision="5">
<author>kore</author>
<date>2008-11-18T09:18:06.468347Z</date>
<msg>- Modified file
</msg>
</logentry>
<logentry revision="1">
<author>kore</author>
<date>2008-11-17T22:56:26.000000Z</date>
<msg>- Added test file</msg>
</logentry>
</log>
"#;

    const BLAME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<blame>
<target path="/tmp/wc/file">
<entry line-number="1">
<commit revision="1">
<author>kore</author>
<date>2008-11-17T22:56:26.000000Z</date>
</commit>
</entry>
<entry line-number="2">
<commit revision="5">
<author>kore</author>
<date>2008-11-18T09:18:06.468347Z</date>
</commit>
</entry>
</target>
</blame>
"#;

    #[test]
    fn test_parse_info() {
        let info = parse_info(INFO).unwrap();
        assert_eq!(info.version, "5");
        assert_eq!(info.author, "kore");
    }

    #[test]
    fn test_parse_log_sorted_oldest_first() {
        let log = parse_log(LOG).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], LogEntry::new("1", "kore", "- Added test file", 1226962586));
        assert_eq!(log[1].version, "5");
        assert_eq!(log[1].message, "- Modified file\n");
        assert_eq!(log[1].timestamp, 1226999886);
    }

    #[test]
    fn test_parse_blame_combines_content() {
        let blame = parse_blame(BLAME, "Some test file\nAnother line in the file\n").unwrap();
        assert_eq!(
            blame,
            vec![
                BlameLine::new("Some test file", "1", "kore", 1226962586),
                BlameLine::new("Another line in the file", "5", "kore", 1226999886),
            ]
        );
    }

    #[test]
    fn test_parse_invalid_xml() {
        assert!(matches!(parse_info("<info><entry>"), Err(VcsError::Parse(_))));
        assert!(matches!(parse_info("<info/>"), Err(VcsError::Parse(_))));
    }

    #[test]
    fn test_update_changed() {
        assert!(!update_changed("Updating '.':\nAt revision 6.\n"));
        assert!(update_changed(
            "Updating '.':\nA    another\nUpdated to revision 7.\n"
        ));
        assert!(update_changed("Updating '.':\n U   dir1\nUpdated to revision 8.\n"));
        assert!(update_changed("D    dir2\nUpdated to revision 3.\n"));
    }

    #[test]
    fn test_command_carries_credentials() {
        let backend = SvnBackend::new(SvnOptions {
            username: Some("kore".into()),
            password: Some("secret".into()),
        });
        assert_eq!(
            backend.command().arg("info").describe(),
            "svn --non-interactive --username kore --password secret info"
        );
    }
}
