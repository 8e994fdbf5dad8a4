//! Structured diff model
//!
//! Every backend produces unified diff text; [`unified::parse_str`] turns it
//! into a list of [`FileDiff`]s. The model is plain data so that parsed diffs
//! can be stored in the metadata cache as they are.

pub mod unified;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use unified::{parse_file, parse_str};

/// Errors returned while parsing diff text.
#[derive(Error, Debug)]
pub enum DiffParseError {
    /// A `@@` line whose ranges are not numeric.
    #[error("malformed hunk header on line {line_number}: {line}")]
    MalformedHunkHeader { line_number: usize, line: String },

    /// A `@@` line before any `---`/`+++` file header.
    #[error("hunk header without file header on line {line_number}")]
    HunkWithoutFile { line_number: usize },

    #[error("failed to read diff: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a single diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineType {
    /// Present only in the new file.
    Added,
    /// Present only in the old file.
    Removed,
    /// Context line, present in both.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub kind: LineType,
    pub content: String,
}

impl Line {
    pub fn new(kind: LineType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn added(content: impl Into<String>) -> Self {
        Self::new(LineType::Added, content)
    }

    pub fn removed(content: impl Into<String>) -> Self {
        Self::new(LineType::Removed, content)
    }

    pub fn unchanged(content: impl Into<String>) -> Self {
        Self::new(LineType::Unchanged, content)
    }
}

/// One hunk. `start`/`start_range` describe the span in the old file,
/// `end`/`end_range` the span in the new file. Both are 1-based; a range of
/// 0 marks a pure insertion or deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub start: u64,
    pub start_range: u64,
    pub end: u64,
    pub end_range: u64,
    pub lines: Vec<Line>,
}

impl Chunk {
    pub fn new(start: u64, start_range: u64, end: u64, end_range: u64) -> Self {
        Self {
            start,
            start_range,
            end,
            end_range,
            lines: Vec::new(),
        }
    }
}

/// Changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub from: String,
    pub to: String,
    pub chunks: Vec<Chunk>,
}

impl FileDiff {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            chunks: Vec::new(),
        }
    }

    /// Rewrite both paths with `f`.
    pub fn map_paths(mut self, mut f: impl FnMut(&str) -> String) -> Self {
        self.from = f(&self.from);
        self.to = f(&self.to);
        self
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.chunks.iter().flat_map(|chunk| chunk.lines.iter())
    }
}
