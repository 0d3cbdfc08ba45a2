//! Folder tree with per-folder configs.
//!
//! `FolderTree` mirrors a directory hierarchy in an arena of
//! [`FolderNode`]s keyed by canonical path. Each node may own one config;
//! lookups walk the parent chain to find the nearest one.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, TreeError};
use crate::node::{FolderNode, NodeId};
use crate::path::{canonicalize, rebase};
use crate::settings::TreeSettings;

/// Host callbacks that produce and release configs.
///
/// Configs are never dropped on the host's behalf while attached: every
/// config detached by a delete goes through [`ConfigStore::destroy`].
pub trait ConfigStore<C> {
    /// Load the config file at `path`. `Ok(None)` if absent or invalid.
    fn load(&mut self, path: &Path) -> anyhow::Result<Option<C>>;

    /// Release host-side resources of a config being detached.
    fn destroy(&mut self, config: &C) -> anyhow::Result<()>;
}

struct Arena<C> {
    nodes: HashMap<NodeId, FolderNode<C>>,
    index: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
    next_id: u64,
}

impl<C> Default for Arena<C> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            index: HashMap::new(),
            root: None,
            next_id: 0,
        }
    }
}

impl<C> Arena<C> {
    fn insert(&mut self, path: PathBuf, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent_node) => parent_node.add_child(id),
            None => self.root = Some(id),
        }

        self.index.insert(path.clone(), id);
        self.nodes.insert(id, FolderNode::new(id, path, parent));
        id
    }

    /// The node and its descendants, every parent before its children.
    fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut to_visit = vec![id];

        while let Some(current) = to_visit.pop() {
            if let Some(node) = self.nodes.get(&current) {
                order.push(current);
                to_visit.extend(node.children.iter().rev().copied());
            }
        }

        order
    }

    /// The node and its descendants, every child before its parent.
    fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = self.pre_order(id);
        order.reverse();
        order
    }

    fn nearest_config(&self, id: NodeId) -> Option<Arc<C>> {
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            if let Some(config) = &node.config {
                return Some(config.clone());
            }
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        None
    }

    fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        depth
    }

    fn configs(&self) -> impl Iterator<Item = (&Path, &Arc<C>)> {
        self.nodes
            .values()
            .filter_map(|node| node.config.as_ref().map(|c| (node.path.as_path(), c)))
    }
}

/// In-memory mirror of a folder hierarchy with per-folder configs.
pub struct FolderTree<C> {
    settings: TreeSettings,
    store: Box<dyn ConfigStore<C>>,
    arena: Arena<C>,
}

impl<C> FolderTree<C> {
    /// Create an empty tree. Call [`FolderTree::init`] to load a hierarchy.
    pub fn new(settings: TreeSettings, store: Box<dyn ConfigStore<C>>) -> Self {
        Self {
            settings,
            store,
            arena: Arena::default(),
        }
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    /// Rebuild the tree from a full walk of `root`.
    ///
    /// A missing root yields an empty tree. If the loader fails, the
    /// previous tree is kept and the error returned.
    pub fn init(&mut self, root: &Path) -> Result<()> {
        let root = canonicalize(root);
        let previous = std::mem::take(&mut self.arena);

        if !root.is_dir() {
            info!("Folder tree root {} does not exist, tree is empty", root.display());
            self.release(previous);
            return Ok(());
        }

        match self.walk_into(&root, None) {
            Ok(configured) => {
                info!(
                    "Loaded folder tree at {} ({} folders, {} configs)",
                    root.display(),
                    self.arena.nodes.len(),
                    configured.len()
                );
                self.release(previous);
                Ok(())
            }
            Err(e) => {
                let partial = std::mem::replace(&mut self.arena, previous);
                self.release(partial);
                Err(e)
            }
        }
    }

    /// Drop every node, destroying their configs.
    pub fn clear(&mut self) {
        let arena = std::mem::take(&mut self.arena);
        self.release(arena);
        debug!("Cleared folder tree");
    }

    /// The indexed node for the directory `path`, if it still exists on disk.
    pub fn get_folder_info(&self, path: &Path) -> Option<&FolderNode<C>> {
        let path = canonicalize(path);
        if !path.is_dir() {
            return None;
        }
        self.arena
            .index
            .get(&path)
            .and_then(|id| self.arena.nodes.get(id))
    }

    /// Id of the node indexed at `path`, whether or not it is still on disk.
    pub fn folder_id(&self, path: &Path) -> Option<NodeId> {
        self.arena.index.get(&canonicalize(path)).copied()
    }

    /// The config governing the directory `path`.
    ///
    /// With `hierarchical`, the nearest config from the folder up to the
    /// root; without, only the folder's own slot.
    pub fn get_asset_config(&self, path: &Path, hierarchical: bool) -> Option<Arc<C>> {
        let node = self.get_folder_info(path)?;
        if hierarchical {
            self.arena.nearest_config(node.id)
        } else {
            node.config.clone()
        }
    }

    /// The config governing a file, resolved through its directory.
    pub fn config_for_file(&self, path: &Path) -> Option<Arc<C>> {
        let path = canonicalize(path);
        self.get_asset_config(path.parent()?, true)
    }

    /// The config a new config created in `path` would override.
    pub fn parent_config(&self, path: &Path) -> Option<Arc<C>> {
        let node = self.get_folder_info(path)?;
        node.parent.and_then(|p| self.arena.nearest_config(p))
    }

    /// Index a new folder under its already indexed parent.
    ///
    /// Adding a folder that is already indexed returns its existing id.
    pub fn add_folder_info(&mut self, path: &Path) -> Result<NodeId> {
        let path = canonicalize(path);
        self.insert_folder(path)
    }

    /// Index a folder together with the subfolders and configs already on
    /// disk beneath it. Returns the folders that got a config.
    pub fn graft(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        let path = canonicalize(path);
        let parent = path
            .parent()
            .and_then(|p| self.arena.index.get(p))
            .copied();
        match parent {
            Some(parent) => self.walk_into(&path, Some(parent)),
            None => Err(TreeError::ParentNotIndexed(path)),
        }
    }

    /// Load the config file at `path` and attach it to its folder.
    ///
    /// A previous attachment is replaced without being destroyed; callers
    /// that mean to discard it delete it first. Returns the attached config,
    /// or `None` if the loader found nothing.
    pub fn add_asset_config(&mut self, path: &Path) -> Result<Option<Arc<C>>> {
        let config_path = canonicalize(path);
        let id = self.folder_of(&config_path)?;

        let Some(config) = self.load(&config_path)? else {
            debug!("No config loaded from {}", config_path.display());
            return Ok(None);
        };

        let config = Arc::new(config);
        if let Some(node) = self.arena.nodes.get_mut(&id) {
            node.config = Some(config.clone());
        }
        debug!("Attached config {}", config_path.display());
        Ok(Some(config))
    }

    /// Destroy and detach the config of the folder owning `path`.
    ///
    /// Returns whether a config was removed.
    pub fn delete_asset_config(&mut self, path: &Path) -> Result<bool> {
        let config_path = canonicalize(path);
        let Some(id) = config_path
            .parent()
            .and_then(|dir| self.arena.index.get(dir))
            .copied()
        else {
            return Ok(false);
        };

        self.destroy_slot(id)
    }

    /// Remove a folder and its whole subtree, destroying every config in it
    /// children first. Returns whether the folder was indexed.
    pub fn delete_folder_info(&mut self, path: &Path) -> Result<bool> {
        let path = canonicalize(path);
        let Some(id) = self.arena.index.get(&path).copied() else {
            return Ok(false);
        };

        let order = self.arena.post_order(id);
        for node_id in &order {
            self.destroy_slot(*node_id)?;
        }

        if let Some(parent) = self.arena.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent_node) = self.arena.nodes.get_mut(&parent) {
                parent_node.remove_child(id);
            }
        }

        for node_id in &order {
            if let Some(node) = self.arena.nodes.remove(node_id) {
                self.arena.index.remove(&node.path);
            }
        }
        if self.arena.root == Some(id) {
            self.arena.root = None;
        }

        info!("Removed folder {} ({} folders)", path.display(), order.len());
        Ok(true)
    }

    /// Move and rename the folder at `source` to `destination`.
    ///
    /// The whole subtree moves with it and every descendant is re-keyed
    /// under the new path. Returns whether `source` was indexed.
    pub fn move_folder_info(&mut self, source: &Path, destination: &Path) -> Result<bool> {
        let from = canonicalize(source);
        let to = canonicalize(destination);

        let Some(id) = self.arena.index.get(&from).copied() else {
            return Ok(false);
        };
        if from == to {
            return Ok(true);
        }
        if to.starts_with(&from) {
            return Err(TreeError::MoveIntoSelf { from, to });
        }
        if self.arena.root == Some(id) {
            return Err(TreeError::MoveRoot(from));
        }
        if self.arena.index.contains_key(&to) {
            return Err(TreeError::AlreadyIndexed(to));
        }
        let Some(new_parent) = to.parent().and_then(|p| self.arena.index.get(p)).copied() else {
            return Err(TreeError::ParentNotIndexed(to));
        };

        let old_parent = self.arena.nodes.get(&id).and_then(|n| n.parent);
        if let Some(parent_node) = old_parent.and_then(|p| self.arena.nodes.get_mut(&p)) {
            parent_node.remove_child(id);
        }
        if let Some(parent_node) = self.arena.nodes.get_mut(&new_parent) {
            parent_node.add_child(id);
        }
        if let Some(node) = self.arena.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }

        let subtree = self.arena.pre_order(id);
        for node_id in &subtree {
            let Some(node) = self.arena.nodes.get_mut(node_id) else {
                continue;
            };
            let Some(new_path) = rebase(&node.path, &from, &to) else {
                warn!("Folder {} is not under {}", node.path.display(), from.display());
                continue;
            };
            self.arena.index.remove(&node.path);
            self.arena.index.insert(new_path.clone(), *node_id);
            node.set_path(new_path);
        }

        info!(
            "Moved folder {} -> {} ({} folders)",
            from.display(),
            to.display(),
            subtree.len()
        );
        Ok(true)
    }

    /// Move a config attachment from `source`'s folder to `destination`'s.
    ///
    /// The config stays alive; any config already attached at the
    /// destination is replaced without being destroyed. Returns the moved
    /// config, `None` if the source folder had none.
    pub fn move_asset_config(
        &mut self,
        source: &Path,
        destination: &Path,
    ) -> Result<Option<Arc<C>>> {
        let from = canonicalize(source);
        let to = canonicalize(destination);

        if !self.settings.is_config_file(&to) {
            return Err(TreeError::ConfigRename { from, to });
        }

        let Some(source_id) = from
            .parent()
            .and_then(|dir| self.arena.index.get(dir))
            .copied()
        else {
            return Ok(None);
        };
        let destination_id = self.folder_of(&to)?;

        let Some(config) = self
            .arena
            .nodes
            .get_mut(&source_id)
            .and_then(|node| node.config.take())
        else {
            return Ok(None);
        };

        if let Some(node) = self.arena.nodes.get_mut(&destination_id) {
            node.config = Some(config.clone());
        }
        debug!("Moved config {} -> {}", from.display(), to.display());
        Ok(Some(config))
    }

    /// The root node.
    pub fn root(&self) -> Option<&FolderNode<C>> {
        self.arena.root.and_then(|id| self.arena.nodes.get(&id))
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> Option<&FolderNode<C>> {
        self.arena.nodes.get(&id)
    }

    /// Whether `path` is indexed, regardless of the disk.
    pub fn contains(&self, path: &Path) -> bool {
        self.arena.index.contains_key(&canonicalize(path))
    }

    /// Number of indexed folders.
    pub fn len(&self) -> usize {
        self.arena.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.nodes.is_empty()
    }

    /// All indexed folder paths.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.arena.index.keys().map(PathBuf::as_path)
    }

    /// All folders below `path`, parents before children.
    pub fn descendants(&self, path: &Path) -> Vec<&FolderNode<C>> {
        let Some(id) = self.arena.index.get(&canonicalize(path)).copied() else {
            return Vec::new();
        };
        self.arena
            .pre_order(id)
            .into_iter()
            .skip(1)
            .filter_map(|node_id| self.arena.nodes.get(&node_id))
            .collect()
    }

    /// Statistics about the tree.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            folders: self.arena.nodes.len(),
            configs: self.arena.configs().count(),
            max_depth: self
                .arena
                .nodes
                .keys()
                .map(|id| self.arena.depth(*id))
                .max()
                .unwrap_or(0),
        }
    }

    fn insert_folder(&mut self, path: PathBuf) -> Result<NodeId> {
        if let Some(id) = self.arena.index.get(&path) {
            return Ok(*id);
        }

        let parent = path
            .parent()
            .and_then(|p| self.arena.index.get(p))
            .copied();
        match parent {
            Some(parent) => {
                debug!("Indexed folder {}", path.display());
                Ok(self.arena.insert(path, Some(parent)))
            }
            None => Err(TreeError::ParentNotIndexed(path)),
        }
    }

    /// Walk `top` and index every folder beneath it, loading configs for
    /// folders that have none yet. `parent` is `None` when `top` becomes
    /// the root.
    ///
    /// Folders are keyed by canonical path, so a folder reached through a
    /// followed link is indexed where the link points.
    fn walk_into(&mut self, top: &Path, parent: Option<NodeId>) -> Result<Vec<PathBuf>> {
        let settings = &self.settings;
        let folders: Vec<(usize, PathBuf)> = WalkDir::new(top)
            .follow_links(settings.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !settings.is_ignored_name(&entry.file_name().to_string_lossy())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", top.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| (entry.depth(), canonicalize(entry.path())))
            .collect();

        // Ids of the folders on the walk's current branch, by depth.
        let mut branch: Vec<NodeId> = Vec::new();
        let mut configured = Vec::new();
        for (depth, folder) in folders {
            branch.truncate(depth);
            let parent_id = if depth == 0 { parent } else { branch.last().copied() };

            let id = match (self.arena.index.get(&folder).copied(), parent_id) {
                (Some(id), _) => id,
                (None, Some(parent_id)) => {
                    debug!("Indexed folder {}", folder.display());
                    self.arena.insert(folder.clone(), Some(parent_id))
                }
                (None, None) if depth == 0 => self.arena.insert(folder.clone(), None),
                (None, None) => return Err(TreeError::ParentNotIndexed(folder)),
            };
            branch.push(id);

            let has_config = self.arena.nodes.get(&id).is_some_and(FolderNode::has_config);
            let config_path = folder.join(&self.settings.config_file_name);
            if has_config || !config_path.is_file() {
                continue;
            }

            if let Some(config) = self.load(&config_path)? {
                if let Some(node) = self.arena.nodes.get_mut(&id) {
                    node.config = Some(Arc::new(config));
                }
                configured.push(folder);
            }
        }

        Ok(configured)
    }

    fn folder_of(&self, config_path: &Path) -> Result<NodeId> {
        let dir = config_path.parent().unwrap_or(config_path);
        self.arena
            .index
            .get(dir)
            .copied()
            .ok_or_else(|| TreeError::FolderNotIndexed(dir.to_path_buf()))
    }

    fn load(&mut self, path: &Path) -> Result<Option<C>> {
        self.store.load(path).map_err(|source| TreeError::Load {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Destroy the config in a node's slot, clearing the slot only once the
    /// host released it.
    fn destroy_slot(&mut self, id: NodeId) -> Result<bool> {
        let Some(node) = self.arena.nodes.get_mut(&id) else {
            return Ok(false);
        };
        let Some(config) = node.config.clone() else {
            return Ok(false);
        };

        self.store
            .destroy(&config)
            .map_err(|source| TreeError::Destroy {
                path: node.path.clone(),
                source,
            })?;
        node.config = None;
        debug!("Destroyed config of {}", node.path.display());
        Ok(true)
    }

    /// Destroy every config of a detached arena, logging failures.
    fn release(&mut self, arena: Arena<C>) {
        for (path, config) in arena.configs() {
            if let Err(e) = self.store.destroy(config) {
                warn!("Failed to destroy config of {}: {e}", path.display());
            }
        }
    }
}

impl<C> fmt::Debug for FolderTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderTree")
            .field("settings", &self.settings)
            .field("folders", &self.arena.nodes.len())
            .field("root", &self.root().map(FolderNode::path))
            .finish()
    }
}

/// Statistics about the folder tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub folders: usize,
    pub configs: usize,
    pub max_depth: usize,
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Folder Tree Statistics:")?;
        writeln!(f, "  Folders: {}", self.folders)?;
        writeln!(f, "  Configs: {}", self.configs)?;
        writeln!(f, "  Max depth: {}", self.max_depth)
    }
}
