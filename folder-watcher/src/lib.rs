//! # Folder Config Watcher
//!
//! This crate watches a folder hierarchy and feeds its changes to a
//! [`folder_config::TreeSynchronizer`].
//!
//! ## Features
//!
//! - **Recursive Watching**: One notify watch on the hierarchy root
//! - **Event Batching**: Debounced batches of raw events
//! - **Rename Pairing**: Both halves of a rename become a single move
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Folder Config Watcher                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatcherSettings ──► FolderWatcher ──► EventBatch               │
//! │                           │                 │                   │
//! │                           ▼                 ▼                   │
//! │                      WatchEvent        PathChange               │
//! │                                             │                   │
//! │                                             ▼                   │
//! │                                     TreeSynchronizer            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod watcher;

pub use config::WatcherSettings;
pub use error::{Result, WatcherError};
pub use event::{EventBatch, WatchEvent, WatchEventKind};
pub use watcher::FolderWatcher;
