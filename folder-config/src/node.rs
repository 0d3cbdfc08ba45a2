//! Folder nodes of the config tree.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identifier of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One directory of the tree.
///
/// The parent and children are ids into the owning tree, so a node can be
/// moved or removed without touching any other node's memory.
#[derive(Debug)]
pub struct FolderNode<C> {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) config: Option<Arc<C>>,
}

impl<C> FolderNode<C> {
    pub(crate) fn new(id: NodeId, path: PathBuf, parent: Option<NodeId>) -> Self {
        Self {
            id,
            name: file_name_of(&path),
            path,
            parent,
            children: Vec::new(),
            config: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Final component of the folder path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical absolute path; the node's key in the index.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parent id, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The config owned by this folder itself, ignoring ancestors.
    pub fn config(&self) -> Option<&Arc<C>> {
        self.config.as_ref()
    }

    pub fn has_config(&self) -> bool {
        self.config.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.name = file_name_of(&path);
        self.path = path;
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
