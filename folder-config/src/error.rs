//! Error types for the folder config tree.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors that can occur while maintaining the folder tree.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The parent directory of a new folder is not in the index.
    #[error("parent folder not indexed: {0}")]
    ParentNotIndexed(PathBuf),

    /// The directory owning a config file is not in the index.
    #[error("folder not indexed: {0}")]
    FolderNotIndexed(PathBuf),

    /// A move destination is already taken by another folder.
    #[error("folder already indexed: {0}")]
    AlreadyIndexed(PathBuf),

    /// A folder cannot be moved underneath itself.
    #[error("cannot move {from} into its own subtree at {to}")]
    MoveIntoSelf { from: PathBuf, to: PathBuf },

    /// The root folder cannot be moved.
    #[error("cannot move the root folder: {0}")]
    MoveRoot(PathBuf),

    /// A config file was renamed away from the recognized name.
    #[error("config file {from} cannot be renamed to {to}")]
    ConfigRename { from: PathBuf, to: PathBuf },

    /// The host failed to load a config.
    #[error("failed to load config {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The host failed to destroy a config.
    #[error("failed to destroy config of {path}: {source}")]
    Destroy {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The host failed to persist a changed target.
    #[error("failed to commit target {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid ignore pattern.
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Settings could not be parsed.
    #[error("settings error: {0}")]
    Settings(#[from] toml::de::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    /// Whether this error is a rejected structural change rather than a
    /// failure of the host.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ParentNotIndexed(_)
                | Self::FolderNotIndexed(_)
                | Self::AlreadyIndexed(_)
                | Self::MoveIntoSelf { .. }
                | Self::MoveRoot(_)
                | Self::ConfigRename { .. }
        )
    }
}
