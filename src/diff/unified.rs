//! Unified diff parser
//!
//! Accepts the output of `git diff`, `svn diff`, `hg diff`, `bzr diff` and
//! `cvs diff -u`. Noise lines between file sections (`Index:`, `===`,
//! `diff -r`, mode and rename headers) are skipped. Hunk bodies are read
//! by the line counts in their header, so a removed line that happens to
//! start with `-- ` is never taken for a file header.

use std::path::Path;

use super::{Chunk, DiffParseError, FileDiff, Line, LineType};

/// Parse a diff read from a file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<FileDiff>, DiffParseError> {
    let bytes = std::fs::read(path)?;
    parse_str(&String::from_utf8_lossy(&bytes))
}

/// Parse unified diff text into per-file diffs, in order of appearance.
pub fn parse_str(input: &str) -> Result<Vec<FileDiff>, DiffParseError> {
    let mut parser = Parser::default();
    for (index, line) in input.lines().enumerate() {
        parser.feed(index + 1, line)?;
    }
    Ok(parser.finish())
}

#[derive(Default)]
struct Parser {
    files: Vec<FileDiff>,
    /// Lines still expected in the open hunk, old side and new side.
    remaining: Option<(u64, u64)>,
    /// Set after a `diff --git` line until its `---` arrives.
    git_header_open: bool,
}

impl Parser {
    fn feed(&mut self, line_number: usize, line: &str) -> Result<(), DiffParseError> {
        if let Some((old, new)) = self.remaining {
            if self.feed_hunk_line(line, old, new) {
                return Ok(());
            }
            self.remaining = None;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            let (from, to) = split_git_header(rest);
            self.files.push(FileDiff::new(from, to));
            self.git_header_open = true;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            let from = header_path(rest);
            match self.files.last_mut() {
                Some(file) if self.git_header_open => file.from = from,
                _ => self.files.push(FileDiff::new(from.clone(), from)),
            }
            self.git_header_open = false;
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            if let Some(file) = self.files.last_mut() {
                file.to = header_path(rest);
            }
        } else if line.starts_with("@@") {
            let chunk = parse_hunk_header(line_number, line)?;
            let file = self
                .files
                .last_mut()
                .ok_or(DiffParseError::HunkWithoutFile { line_number })?;
            self.remaining = Some((chunk.start_range, chunk.end_range));
            self.git_header_open = false;
            file.chunks.push(chunk);
        }
        Ok(())
    }

    /// Consume one line of an open hunk. Returns false when the line does not
    /// belong to the hunk.
    fn feed_hunk_line(&mut self, line: &str, old: u64, new: u64) -> bool {
        if line.starts_with('\\') {
            // "\ No newline at end of file"
            return true;
        }
        if old == 0 && new == 0 {
            return false;
        }

        let (kind, content) = match line.chars().next() {
            Some('+') if new > 0 => (LineType::Added, &line[1..]),
            Some('-') if old > 0 => (LineType::Removed, &line[1..]),
            Some(' ') if old > 0 && new > 0 => (LineType::Unchanged, &line[1..]),
            // Some tools strip the leading space of empty context lines.
            None if old > 0 && new > 0 => (LineType::Unchanged, ""),
            _ => return false,
        };

        self.remaining = Some(match kind {
            LineType::Added => (old, new - 1),
            LineType::Removed => (old - 1, new),
            LineType::Unchanged => (old - 1, new - 1),
        });

        if let Some(chunk) = self.files.last_mut().and_then(|f| f.chunks.last_mut()) {
            chunk.lines.push(Line::new(kind, content));
        }
        true
    }

    fn finish(self) -> Vec<FileDiff> {
        self.files
    }
}

/// Path from a `---`/`+++` header, without the tab-separated timestamp that
/// svn, bzr and cvs append.
fn header_path(rest: &str) -> String {
    let path = rest.split('\t').next().unwrap_or(rest);
    path.trim_end().to_string()
}

fn split_git_header(rest: &str) -> (String, String) {
    match rest.rsplit_once(" b/") {
        Some((from, to)) => (from.to_string(), format!("b/{to}")),
        None => (rest.to_string(), rest.to_string()),
    }
}

/// Parse `@@ -start[,range] +start[,range] @@[ section]`.
fn parse_hunk_header(line_number: usize, line: &str) -> Result<Chunk, DiffParseError> {
    let malformed = || DiffParseError::MalformedHunkHeader {
        line_number,
        line: line.to_string(),
    };

    let mut fields = line.split_whitespace();
    if fields.next() != Some("@@") {
        return Err(malformed());
    }
    let old = fields
        .next()
        .and_then(|f| f.strip_prefix('-'))
        .ok_or_else(malformed)?;
    let new = fields
        .next()
        .and_then(|f| f.strip_prefix('+'))
        .ok_or_else(malformed)?;
    if fields.next() != Some("@@") {
        return Err(malformed());
    }

    let (start, start_range) = parse_range(old).ok_or_else(malformed)?;
    let (end, end_range) = parse_range(new).ok_or_else(malformed)?;
    Ok(Chunk::new(start, start_range, end, end_range))
}

fn parse_range(field: &str) -> Option<(u64, u64)> {
    match field.split_once(',') {
        Some((start, range)) => Some((start.parse().ok()?, range.parse().ok()?)),
        None => Some((field.parse().ok()?, 1)),
    }
}
