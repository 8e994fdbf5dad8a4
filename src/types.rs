//! Plain data returned by resources. All of it is cacheable.

use serde::{Deserialize, Serialize};

/// One commit in a resource's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub version: String,
    pub author: String,
    pub message: String,
    /// Commit time, seconds since the Unix epoch.
    pub timestamp: i64,
}

impl LogEntry {
    pub fn new(
        version: impl Into<String>,
        author: impl Into<String>,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            version: version.into(),
            author: author.into(),
            message: message.into(),
            timestamp,
        }
    }
}

/// History of a resource, oldest first, keyed by version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    /// Build a log from entries in oldest-first order. A version listed twice
    /// keeps its first position.
    pub fn new(entries: Vec<LogEntry>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| seen.insert(e.version.clone()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, version: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_some()
    }

    /// Index of `version` in oldest-first order.
    pub fn position(&self, version: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.version == version)
    }

    pub fn versions(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.version.clone()).collect()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Log {
    type Item = &'a LogEntry;
    type IntoIter = std::slice::Iter<'a, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Attribution of one line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameLine {
    pub content: String,
    pub version: String,
    pub author: String,
    pub timestamp: i64,
}

impl BlameLine {
    pub fn new(
        content: impl Into<String>,
        version: impl Into<String>,
        author: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            content: content.into(),
            version: version.into(),
            author: author.into(),
            timestamp,
        }
    }
}

/// Current version and its author, as reported by the backend's info command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub version: String,
    pub author: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Log {
        Log::new(vec![
            LogEntry::new("a1", "kore", "first\n", 100),
            LogEntry::new("b2", "kore", "second\n", 200),
            LogEntry::new("c3", "tobias", "third\n", 300),
        ])
    }

    #[test]
    fn test_lookup_by_version() {
        let log = sample();
        assert_eq!(log.get("b2").map(|e| e.timestamp), Some(200));
        assert!(log.get("zz").is_none());
        assert_eq!(log.position("c3"), Some(2));
        assert_eq!(log.latest().map(|e| e.version.as_str()), Some("c3"));
    }

    #[test]
    fn test_versions_oldest_first() {
        assert_eq!(sample().versions(), vec!["a1", "b2", "c3"]);
    }

    #[test]
    fn test_duplicate_version_keeps_first() {
        let log = Log::new(vec![
            LogEntry::new("1", "a", "one", 1),
            LogEntry::new("1", "b", "dup", 2),
        ]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("1").map(|e| e.author.as_str()), Some("a"));
    }
}
