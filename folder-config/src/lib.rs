//! # Folder Config
//!
//! This crate keeps per-folder configuration for a directory hierarchy and
//! projects it onto the files beneath each folder.
//!
//! ## Features
//!
//! - **Folder Tree**: In-memory mirror of a directory hierarchy, one optional
//!   config per folder
//! - **Hierarchical Resolution**: A folder without a config inherits the
//!   nearest ancestor's
//! - **Structural Apply**: Copy matching members between unrelated settings
//!   types
//! - **Synchronization**: Keep the tree in step with filesystem events and
//!   re-apply configs when they change
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Folder Config                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  PathChange ──► TreeSynchronizer ──► FolderTree                 │
//! │                       │                  │                      │
//! │                       ▼                  ▼                      │
//! │               SectionRegistry       ConfigStore                 │
//! │                       │                                         │
//! │                       ▼                                         │
//! │                  apply() ──► TargetHost                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod apply;
pub mod error;
pub mod event;
pub mod node;
pub mod path;
pub mod registry;
pub mod settings;
pub mod sync;
pub mod tree;

pub use apply::{FieldDescriptor, FieldPlan, FieldType, Leaf, Reflect, Value, apply, diff};
pub use error::{Result, TreeError};
pub use event::{EntryKind, FolderEvent, PathChange};
pub use node::{FolderNode, NodeId};
pub use registry::{SectionFn, SectionRegistry};
pub use settings::{DEFAULT_CONFIG_FILE_NAME, TreeSettings};
pub use sync::{BatchReport, Rejection, TargetHost, TreeSynchronizer};
pub use tree::{ConfigStore, FolderTree, TreeStats};
