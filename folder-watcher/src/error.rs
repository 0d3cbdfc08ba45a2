//! Error types for the folder watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the folder watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Watched root not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// The event channel closed, usually because the watcher was stopped.
    #[error("event channel closed")]
    ChannelClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Settings could not be parsed.
    #[error("settings error: {0}")]
    Settings(#[from] toml::de::Error),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// The synchronizer failed on a batch.
    #[error("sync error: {0}")]
    Tree(#[from] folder_config::TreeError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
