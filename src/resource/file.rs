use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Authored, Diffable, Logged, Resource, ResourceCore, Versioned, WorkingCopy};
use crate::error::Result;
use crate::types::BlameLine;

const FACET_CONTENT: &str = "content";
const FACET_BLAME: &str = "blame";
const FACET_MIME_TYPE: &str = "prop:mime-type";

/// Reported when the backend has no mime-type property for a file.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Content is cached as text when it is valid UTF-8.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredContent {
    Text(String),
    Binary(Vec<u8>),
}

impl From<Vec<u8>> for StoredContent {
    fn from(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Binary(err.into_bytes()),
        }
    }
}

impl From<StoredContent> for Vec<u8> {
    fn from(content: StoredContent) -> Self {
        match content {
            StoredContent::Text(text) => text.into_bytes(),
            StoredContent::Binary(bytes) => bytes,
        }
    }
}

/// A versioned file.
#[derive(Debug, Clone)]
pub struct File {
    core: ResourceCore,
}

impl File {
    /// File at `path` (root-relative, e.g. `/dir1/file`).
    pub fn new(copy: Arc<WorkingCopy>, path: impl Into<String>) -> Self {
        let mut path: String = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            core: ResourceCore::new(copy, path),
        }
    }

    /// Content of the file as it is in the working copy.
    pub fn contents(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.core.local_path())?)
    }

    /// Mime type from the VCS properties, if the backend keeps any.
    pub fn mime_type(&self) -> Result<String> {
        let version = self.version_string()?.to_string();
        let mime: Option<String> = self.core.cached_or_fetch(&version, FACET_MIME_TYPE, || {
            self.core
                .backend()
                .property(&self.core.target(), &version, "mime-type")
        })?;
        Ok(mime
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()))
    }
}

impl Resource for File {
    fn core(&self) -> &ResourceCore {
        &self.core
    }
}

impl Versioned for File {}
impl Authored for File {}
impl Logged for File {}
impl Diffable for File {}

pub trait Fetchable: Resource {
    /// Content of the file at `version`.
    fn versioned_content(&self, version: &str) -> Result<Vec<u8>>;
}

impl Fetchable for File {
    fn versioned_content(&self, version: &str) -> Result<Vec<u8>> {
        self.core.require_version(version)?;
        let content: StoredContent = self.core.cached_or_fetch(version, FACET_CONTENT, || {
            Ok(self.core.backend().cat(&self.core.target(), version)?.into())
        })?;
        Ok(content.into())
    }
}

pub trait Blameable: Resource {
    /// Per-line attribution at `version` (default: current). `None` when the
    /// file cannot be blamed, e.g. because it is binary.
    fn blame(&self, version: Option<&str>) -> Result<Option<Vec<BlameLine>>>;
}

impl Blameable for File {
    fn blame(&self, version: Option<&str>) -> Result<Option<Vec<BlameLine>>> {
        let version = match version {
            Some(version) => version.to_string(),
            None => self.version_string()?.to_string(),
        };
        self.core.require_version(&version)?;

        self.core.cached_or_fetch(&version, FACET_BLAME, || {
            if self.versioned_content(&version)?.contains(&0) {
                log::debug!("not blaming binary file {}", self.path());
                return Ok(None);
            }
            let log = self.core.log()?;
            self.core.backend().blame(&self.core.target(), &version, log)
        })
    }
}
