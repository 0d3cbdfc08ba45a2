//! Filesystem change events consumed by the synchronizer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Whether a changed path is a directory, as far as the source knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    /// The source could not tell, e.g. the path is already gone.
    Unknown,
}

impl EntryKind {
    /// Inspect `path` on disk.
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => Self::Directory,
            Ok(_) => Self::File,
            Err(_) => Self::Unknown,
        }
    }
}

/// An unclassified change reported by a filesystem event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathChange {
    Created { path: PathBuf, kind: EntryKind },
    Deleted { path: PathBuf, kind: EntryKind },
    Moved {
        from: PathBuf,
        to: PathBuf,
        kind: EntryKind,
    },
}

impl PathChange {
    /// A creation, with the kind read from disk.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = EntryKind::of(&path);
        Self::Created { path, kind }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::Deleted {
            path: path.into(),
            kind: EntryKind::Unknown,
        }
    }

    /// A move, with the kind read from the destination on disk.
    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let to = to.into();
        let kind = EntryKind::of(&to);
        Self::Moved {
            from: from.into(),
            to,
            kind,
        }
    }

    /// Every path the change touches.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Created { path, .. } | Self::Deleted { path, .. } => vec![path.as_path()],
            Self::Moved { from, to, .. } => vec![from.as_path(), to.as_path()],
        }
    }
}

/// A classified change the synchronizer acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FolderEvent {
    FolderCreated { path: PathBuf },
    FolderDeleted { path: PathBuf },
    FolderMoved { from: PathBuf, to: PathBuf },
    ConfigCreated { path: PathBuf },
    ConfigDeleted { path: PathBuf },
    ConfigMoved { from: PathBuf, to: PathBuf },
    AssetCreated { path: PathBuf },
    AssetMoved { from: PathBuf, to: PathBuf },
}

impl FolderEvent {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FolderCreated { .. } => "folder created",
            Self::FolderDeleted { .. } => "folder deleted",
            Self::FolderMoved { .. } => "folder moved",
            Self::ConfigCreated { .. } => "config created",
            Self::ConfigDeleted { .. } => "config deleted",
            Self::ConfigMoved { .. } => "config moved",
            Self::AssetCreated { .. } => "asset created",
            Self::AssetMoved { .. } => "asset moved",
        }
    }

    /// The path the event ends at.
    pub fn path(&self) -> &Path {
        match self {
            Self::FolderCreated { path }
            | Self::FolderDeleted { path }
            | Self::ConfigCreated { path }
            | Self::ConfigDeleted { path }
            | Self::AssetCreated { path } => path,
            Self::FolderMoved { to, .. }
            | Self::ConfigMoved { to, .. }
            | Self::AssetMoved { to, .. } => to,
        }
    }

    /// Whether handling the event changes the shape of the tree or a
    /// config slot.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::AssetCreated { .. } | Self::AssetMoved { .. })
    }
}
