use std::sync::{Arc, OnceLock};

use super::{
    Authored, Diffable, File, Logged, Resource, ResourceCore, Versioned, WorkingCopy, path,
};
use crate::error::Result;

/// A child of a directory.
#[derive(Debug, Clone)]
pub enum Node {
    File(File),
    Directory(Directory),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Self::File(file) => file.path(),
            Self::Directory(dir) => dir.path(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }
}

/// A versioned directory. Its children are listed once, on first access,
/// and not re-read afterwards.
#[derive(Debug, Clone)]
pub struct Directory {
    core: ResourceCore,
    children: OnceLock<Vec<Node>>,
}

impl Directory {
    /// Directory at `path` (root-relative, e.g. `/dir1/`).
    pub fn new(copy: Arc<WorkingCopy>, path: impl Into<String>) -> Self {
        let path: String = path.into();
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        Self {
            core: ResourceCore::new(copy, path::dir_path(&parts)),
            children: OnceLock::new(),
        }
    }

    /// Children in filesystem order, skipping the VCS metadata directory and
    /// links that lead out of the working copy. Links are classified by what
    /// they point at.
    pub fn children(&self) -> Result<&[Node]> {
        if let Some(children) = self.children.get() {
            return Ok(children);
        }

        let copy = self.core.copy();
        let skip = copy.backend().metadata_dir();
        let mut children = Vec::new();
        for entry in std::fs::read_dir(self.core.local_path())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("skipping non UTF-8 entry {:?} in {}", name, self.path());
                continue;
            };
            if name == skip {
                continue;
            }
            let Some(is_dir) = copy.classify(&entry.path()) else {
                continue;
            };
            let child = path::child_path(self.path(), name, is_dir);
            children.push(if is_dir {
                Node::Directory(Directory::new(copy.clone(), child))
            } else {
                Node::File(File::new(copy.clone(), child))
            });
        }

        Ok(self.children.get_or_init(|| children))
    }

    pub fn has_children(&self) -> Result<bool> {
        Ok(!self.children()?.is_empty())
    }

    pub fn iter(&self) -> Result<std::slice::Iter<'_, Node>> {
        Ok(self.children()?.iter())
    }

    /// This directory and everything below it, depth first, each directory
    /// before its contents.
    pub fn walk(&self) -> Result<Vec<Node>> {
        let mut nodes = vec![Node::Directory(self.clone())];
        self.walk_into(&mut nodes)?;
        Ok(nodes)
    }

    fn walk_into(&self, nodes: &mut Vec<Node>) -> Result<()> {
        for child in self.children()? {
            nodes.push(child.clone());
            if let Node::Directory(dir) = child {
                dir.walk_into(nodes)?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path() && self.root() == other.root()
    }
}

impl Resource for Directory {
    fn core(&self) -> &ResourceCore {
        &self.core
    }
}

impl Versioned for Directory {}
impl Authored for Directory {}
impl Logged for Directory {}
impl Diffable for Directory {}
