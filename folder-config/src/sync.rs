//! Keeps the folder tree in step with the filesystem.
//!
//! The `TreeSynchronizer` is the only writer of its [`FolderTree`]. It
//! turns filesystem changes into tree mutations and, when a folder's config
//! changes, re-applies configs to the targets that resolve to it.
//!
//! A batch is handled in two phases: every structural mutation first, then
//! propagation against the resulting tree. Propagation never interleaves
//! with mutations of the same batch.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::apply::{Reflect, apply};
use crate::error::{Result, TreeError};
use crate::event::{EntryKind, FolderEvent, PathChange};
use crate::node::NodeId;
use crate::path::canonicalize;
use crate::registry::SectionRegistry;
use crate::tree::FolderTree;

/// Host side of the targets configs are applied to.
pub trait TargetHost {
    /// Paths of every target file beneath `dir`, at any depth.
    fn targets_under(&self, dir: &Path) -> Vec<PathBuf>;

    /// Kind tag and settings of the target at `path`.
    fn target_mut(&mut self, path: &Path) -> Option<(&str, &mut dyn Reflect)>;

    /// Persist or re-import a target whose settings were changed.
    fn commit(&mut self, path: &Path) -> anyhow::Result<()>;
}

/// A structural event the tree refused.
#[derive(Debug)]
pub struct Rejection {
    pub event: FolderEvent,
    pub error: TreeError,
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Events applied to the tree.
    pub applied: usize,

    /// Events refused as invariant violations.
    pub rejected: Vec<Rejection>,

    /// Targets a config section was applied to.
    pub targets_visited: usize,

    /// Targets whose settings changed and were committed.
    pub targets_changed: usize,
}

/// Deferred work, keyed by node so later moves in the batch are followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Propagation {
    /// Re-apply the folder's effective config to the targets beneath it
    /// that resolve to that same config.
    Subtree(NodeId),

    /// Apply the resolved config to one target.
    Single { folder: NodeId, file: OsString },
}

#[derive(Default)]
struct Batch {
    report: BatchReport,
    work: Vec<Propagation>,
}

/// Owns a folder tree and keeps it consistent with filesystem events.
pub struct TreeSynchronizer<C> {
    tree: FolderTree<C>,
    registry: SectionRegistry<C>,
}

impl<C> TreeSynchronizer<C> {
    pub fn new(tree: FolderTree<C>, registry: SectionRegistry<C>) -> Self {
        Self { tree, registry }
    }

    /// Rebuild the tree from a full walk of `root`.
    pub fn init(&mut self, root: &Path) -> Result<()> {
        self.tree.init(root)
    }

    pub fn tree(&self) -> &FolderTree<C> {
        &self.tree
    }

    pub fn registry(&self) -> &SectionRegistry<C> {
        &self.registry
    }

    /// The config governing the directory `path`.
    pub fn resolve(&self, path: &Path, hierarchical: bool) -> Option<Arc<C>> {
        self.tree.get_asset_config(path, hierarchical)
    }

    /// The config governing the target file at `path`.
    pub fn resolve_for_target(&self, path: &Path) -> Option<Arc<C>> {
        self.tree.config_for_file(path)
    }

    /// Handle a single event.
    pub fn handle(&mut self, event: FolderEvent, host: &mut dyn TargetHost) -> Result<BatchReport> {
        self.process_batch([event], host)
    }

    /// Handle a batch of classified events.
    pub fn process_batch(
        &mut self,
        events: impl IntoIterator<Item = FolderEvent>,
        host: &mut dyn TargetHost,
    ) -> Result<BatchReport> {
        let mut batch = Batch::default();
        for event in events {
            self.mutate_recorded(event, &mut batch)?;
        }
        self.finish(batch, host)
    }

    /// Classify and handle a batch of raw changes.
    ///
    /// Each change is classified against the tree as left by the changes
    /// before it, so a folder created and deleted in one batch is tracked.
    pub fn process_changes(
        &mut self,
        changes: impl IntoIterator<Item = PathChange>,
        host: &mut dyn TargetHost,
    ) -> Result<BatchReport> {
        let mut batch = Batch::default();
        for change in changes {
            match self.classify(&change) {
                Some(event) => self.mutate_recorded(event, &mut batch)?,
                None => trace!("Ignoring change {change:?}"),
            }
        }
        self.finish(batch, host)
    }

    /// Re-apply the effective config of `dir` to every target beneath it
    /// that resolves to that config.
    pub fn apply_below(&self, dir: &Path, host: &mut dyn TargetHost) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        self.reapply_below(&canonicalize(dir), host, &mut report)?;
        info!(
            "Applied config below {} ({} targets, {} changed)",
            dir.display(),
            report.targets_visited,
            report.targets_changed
        );
        Ok(report)
    }

    /// Turn a raw change into the event the tree acts on.
    ///
    /// Returns `None` for changes outside the root, under ignored folders,
    /// and for deleted assets, which need no tree work.
    pub fn classify(&self, change: &PathChange) -> Option<FolderEvent> {
        let root = self.tree.root()?.path();

        match change {
            PathChange::Created { path, kind } => {
                let is_dir = match kind {
                    EntryKind::Directory => true,
                    EntryKind::File => false,
                    EntryKind::Unknown => path.is_dir(),
                };
                if !self.tracks(root, path, is_dir) {
                    return None;
                }
                Some(self.created_event(path, is_dir))
            }
            PathChange::Deleted { path, kind } => {
                let is_dir = match kind {
                    EntryKind::Directory => true,
                    EntryKind::File => false,
                    EntryKind::Unknown => self.tree.contains(path),
                };
                if !self.tracks(root, path, is_dir) {
                    return None;
                }
                self.deleted_event(path, is_dir)
            }
            PathChange::Moved { from, to, kind } => {
                let is_dir = match kind {
                    EntryKind::Directory => true,
                    EntryKind::File => false,
                    EntryKind::Unknown => to.is_dir() || self.tree.contains(from),
                };
                let settings = self.tree.settings();

                match (self.tracks(root, from, is_dir), self.tracks(root, to, is_dir)) {
                    (false, false) => None,
                    (true, false) => self.deleted_event(from, is_dir),
                    (false, true) => Some(self.created_event(to, is_dir)),
                    (true, true) if is_dir => Some(if self.tree.contains(from) {
                        FolderEvent::FolderMoved {
                            from: from.clone(),
                            to: to.clone(),
                        }
                    } else {
                        FolderEvent::FolderCreated { path: to.clone() }
                    }),
                    (true, true) if settings.is_config_file(from) => Some(FolderEvent::ConfigMoved {
                        from: from.clone(),
                        to: to.clone(),
                    }),
                    (true, true) if settings.is_config_file(to) => {
                        Some(FolderEvent::ConfigCreated { path: to.clone() })
                    }
                    (true, true) => Some(FolderEvent::AssetMoved {
                        from: from.clone(),
                        to: to.clone(),
                    }),
                }
            }
        }
    }

    fn created_event(&self, path: &Path, is_dir: bool) -> FolderEvent {
        let path = path.to_path_buf();
        if is_dir {
            FolderEvent::FolderCreated { path }
        } else if self.tree.settings().is_config_file(&path) {
            FolderEvent::ConfigCreated { path }
        } else {
            FolderEvent::AssetCreated { path }
        }
    }

    fn deleted_event(&self, path: &Path, is_dir: bool) -> Option<FolderEvent> {
        let path = path.to_path_buf();
        if is_dir {
            Some(FolderEvent::FolderDeleted { path })
        } else if self.tree.settings().is_config_file(&path) {
            Some(FolderEvent::ConfigDeleted { path })
        } else {
            None
        }
    }

    /// Whether `path` lies under the root, or directly in an indexed folder
    /// reached through a link, and outside ignored folders.
    fn tracks(&self, root: &Path, path: &Path, is_dir: bool) -> bool {
        let path = canonicalize(path);
        let settings = self.tree.settings();
        if path.starts_with(root) {
            let folder = if is_dir {
                path.as_path()
            } else {
                path.parent().unwrap_or(&path)
            };
            return !settings.is_ignored(root, folder);
        }

        if !path.parent().is_some_and(|parent| self.tree.contains(parent)) {
            return false;
        }
        !is_dir
            || path
                .file_name()
                .is_some_and(|name| !settings.is_ignored_name(&name.to_string_lossy()))
    }

    fn mutate_recorded(&mut self, event: FolderEvent, batch: &mut Batch) -> Result<()> {
        debug!("Handling {}: {}", event.label(), event.path().display());
        match self.mutate(&event, &mut batch.work) {
            Ok(()) => {
                batch.report.applied += 1;
                Ok(())
            }
            Err(error) if error.is_rejection() => {
                warn!("Rejected {}: {error}", event.label());
                batch.report.rejected.push(Rejection { event, error });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn mutate(&mut self, event: &FolderEvent, work: &mut Vec<Propagation>) -> Result<()> {
        let reapply_on_delete = self.tree.settings().reapply_on_delete;

        match event {
            FolderEvent::FolderCreated { path } => {
                let configured = self.tree.graft(path)?;
                work.extend(self.subtree(path));
                work.extend(configured.iter().filter_map(|dir| self.subtree(dir)));
            }
            FolderEvent::FolderDeleted { path } => {
                self.tree.delete_folder_info(path)?;
            }
            FolderEvent::FolderMoved { from, to } => {
                self.tree.move_folder_info(from, to)?;
            }
            FolderEvent::ConfigCreated { path } => {
                let dir = folder_of(path);
                // A create over an attached config is an overwrite.
                if self.tree.get_asset_config(&dir, false).is_some() {
                    self.tree.delete_asset_config(path)?;
                }
                if self.tree.add_asset_config(path)?.is_some() {
                    work.extend(self.subtree(&dir));
                }
            }
            FolderEvent::ConfigDeleted { path } => {
                if self.tree.delete_asset_config(path)? && reapply_on_delete {
                    work.extend(self.subtree(&folder_of(path)));
                }
            }
            FolderEvent::ConfigMoved { from, to } => {
                if !self.tree.settings().is_config_file(to) {
                    return Err(TreeError::ConfigRename {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }

                let from_dir = folder_of(from);
                let to_dir = folder_of(to);
                if from_dir == to_dir {
                    return Ok(());
                }
                if !self.tree.contains(&to_dir) {
                    return Err(TreeError::FolderNotIndexed(to_dir));
                }
                if self.tree.get_asset_config(&from_dir, false).is_none() {
                    // Nothing attached at the source; load it where it landed.
                    return self.mutate(&FolderEvent::ConfigCreated { path: to.clone() }, work);
                }

                if self.tree.get_asset_config(&to_dir, false).is_some() {
                    self.tree.delete_asset_config(to)?;
                }
                if self.tree.move_asset_config(from, to)?.is_some() {
                    work.extend(self.subtree(&to_dir));
                    if reapply_on_delete {
                        work.extend(self.subtree(&from_dir));
                    }
                }
            }
            FolderEvent::AssetCreated { path } => {
                work.extend(self.single(path));
            }
            FolderEvent::AssetMoved { to, .. } => {
                work.extend(self.single(to));
            }
        }

        Ok(())
    }

    fn subtree(&self, dir: &Path) -> Option<Propagation> {
        let id = self.tree.folder_id(dir);
        if id.is_none() {
            debug!("{} is not indexed, nothing to propagate", dir.display());
        }
        id.map(Propagation::Subtree)
    }

    fn single(&self, path: &Path) -> Option<Propagation> {
        let path = canonicalize(path);
        let file = path.file_name()?.to_os_string();
        let Some(folder) = path.parent().and_then(|dir| self.tree.folder_id(dir)) else {
            debug!("Folder of {} is not indexed", path.display());
            return None;
        };
        Some(Propagation::Single { folder, file })
    }

    fn finish(&self, batch: Batch, host: &mut dyn TargetHost) -> Result<BatchReport> {
        let Batch { mut report, work } = batch;

        let mut seen = HashSet::new();
        for item in work {
            if !seen.insert(item.clone()) {
                continue;
            }
            // Paths are read now, after every mutation of the batch.
            match item {
                Propagation::Subtree(id) => match self.tree.node(id) {
                    Some(node) => self.reapply_below(node.path(), host, &mut report)?,
                    None => debug!("Folder {id} left the tree before propagation"),
                },
                Propagation::Single { folder, file } => {
                    let Some(node) = self.tree.node(folder) else {
                        debug!("Folder {folder} left the tree before propagation");
                        continue;
                    };
                    let path = node.path().join(&file);
                    match self.tree.config_for_file(&path) {
                        Some(config) => {
                            self.apply_target(&path, &config, host, &mut report)?;
                        }
                        None => debug!("No config governs {}", path.display()),
                    }
                }
            }
        }

        if report.applied > 0 || !report.rejected.is_empty() {
            info!(
                "Processed batch: {} applied, {} rejected, {} targets ({} changed)",
                report.applied,
                report.rejected.len(),
                report.targets_visited,
                report.targets_changed
            );
        }
        Ok(report)
    }

    fn reapply_below(
        &self,
        dir: &Path,
        host: &mut dyn TargetHost,
        report: &mut BatchReport,
    ) -> Result<()> {
        let Some(config) = self.tree.get_asset_config(dir, true) else {
            debug!("No config governs {}", dir.display());
            return Ok(());
        };

        for target in host.targets_under(dir) {
            if self.tree.settings().is_config_file(&target) {
                continue;
            }
            // Targets under a deeper folder with its own config keep it.
            let governed = self
                .tree
                .config_for_file(&target)
                .is_some_and(|resolved| Arc::ptr_eq(&resolved, &config));
            if !governed {
                trace!("{} is governed by another config", target.display());
                continue;
            }
            self.apply_target(&target, &config, host, report)?;
        }

        Ok(())
    }

    fn apply_target(
        &self,
        path: &Path,
        config: &C,
        host: &mut dyn TargetHost,
        report: &mut BatchReport,
    ) -> Result<bool> {
        let changed = {
            let Some((kind, settings)) = host.target_mut(path) else {
                debug!("No target at {}", path.display());
                return Ok(false);
            };
            let Some(section) = self.registry.section(kind, config) else {
                debug!("No config section for target kind {kind}");
                return Ok(false);
            };
            report.targets_visited += 1;
            apply(section, settings)
        };

        if changed {
            host.commit(path).map_err(|source| TreeError::Commit {
                path: path.to_path_buf(),
                source,
            })?;
            report.targets_changed += 1;
            debug!("Applied config to {}", path.display());
        }
        Ok(changed)
    }
}

fn folder_of(path: &Path) -> PathBuf {
    let path = canonicalize(path);
    match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => path,
    }
}
