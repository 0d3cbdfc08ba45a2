//! Raw watch events and their translation into path changes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use folder_config::{EntryKind, PathChange};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

/// Kind of raw watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Entry was created.
    Created(EntryKind),

    /// File content changed.
    Modified,

    /// Entry was removed.
    Deleted(EntryKind),

    /// Rename, old path.
    RenamedFrom,

    /// Rename, new path.
    RenamedTo,

    /// Rename with both paths, old first.
    Renamed,

    /// Rename of unknown direction.
    RenamedAny,

    /// Metadata, access and other events.
    Other,
}

impl From<notify::EventKind> for WatchEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(create) => Self::Created(match create {
                CreateKind::File => EntryKind::File,
                CreateKind::Folder => EntryKind::Directory,
                _ => EntryKind::Unknown,
            }),
            notify::EventKind::Remove(remove) => Self::Deleted(match remove {
                RemoveKind::File => EntryKind::File,
                RemoveKind::Folder => EntryKind::Directory,
                _ => EntryKind::Unknown,
            }),
            notify::EventKind::Modify(ModifyKind::Name(rename)) => match rename {
                RenameMode::From => Self::RenamedFrom,
                RenameMode::To => Self::RenamedTo,
                RenameMode::Both => Self::Renamed,
                _ => Self::RenamedAny,
            },
            notify::EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Self::Modified,
            _ => Self::Other,
        }
    }
}

/// A raw event received from the notify backend.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,

    /// Affected paths; two for [`WatchEventKind::Renamed`].
    pub paths: Vec<PathBuf>,

    /// Cookie tying the halves of a rename together, when the backend has one.
    pub tracker: Option<usize>,

    /// When the event was received.
    pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, paths: Vec<PathBuf>) -> Self {
        Self {
            kind,
            paths,
            tracker: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tracker(mut self, tracker: usize) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

impl From<notify::Event> for WatchEvent {
    fn from(event: notify::Event) -> Self {
        let tracker = event.attrs.tracker();
        Self {
            kind: WatchEventKind::from(event.kind),
            paths: event.paths,
            tracker,
            timestamp: Utc::now(),
        }
    }
}

/// Raw events collected within one debounce window.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<WatchEvent>,

    /// When the first event of the batch arrived.
    pub created_at: DateTime<Utc>,
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBatch {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, event: WatchEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Translate the batch into path changes, in arrival order.
    ///
    /// The two halves of a rename are joined into one move. A half whose
    /// partner never arrived is a deletion (old path) or creation (new
    /// path), since the other side lies outside the watched root.
    pub fn into_changes(self) -> Vec<PathChange> {
        let mut changes: Vec<PathChange> = Vec::new();
        // tracker -> (slot in `changes`, old path)
        let mut open: HashMap<usize, (usize, PathBuf)> = HashMap::new();
        let mut untracked: Option<(usize, PathBuf)> = None;
        let mut paired: HashSet<usize> = HashSet::new();

        for event in self.events {
            let tracker = event.tracker;
            match event.kind {
                WatchEventKind::Created(kind) => {
                    for path in event.paths {
                        let kind = match kind {
                            EntryKind::Unknown => EntryKind::of(&path),
                            known => known,
                        };
                        changes.push(PathChange::Created { path, kind });
                    }
                }
                WatchEventKind::Modified => {
                    // Rewritten files are re-read like new ones.
                    for path in event.paths.into_iter().filter(|p| p.is_file()) {
                        changes.push(PathChange::Created {
                            path,
                            kind: EntryKind::File,
                        });
                    }
                }
                WatchEventKind::Deleted(kind) => {
                    for path in event.paths {
                        changes.push(PathChange::Deleted { path, kind });
                    }
                }
                WatchEventKind::RenamedFrom => {
                    for path in event.paths {
                        if tracker.is_some_and(|t| paired.contains(&t)) {
                            continue;
                        }
                        let slot = changes.len();
                        changes.push(PathChange::deleted(path.clone()));
                        match tracker {
                            Some(t) => {
                                open.insert(t, (slot, path));
                            }
                            None => untracked = Some((slot, path)),
                        }
                    }
                }
                WatchEventKind::RenamedTo => {
                    for path in event.paths {
                        let from = match tracker {
                            Some(t) if paired.contains(&t) => continue,
                            Some(t) => open.remove(&t),
                            None => untracked.take(),
                        };
                        match from {
                            Some((slot, from)) => {
                                changes[slot] = PathChange::moved(from, path);
                                if let Some(t) = tracker {
                                    paired.insert(t);
                                }
                            }
                            None => changes.push(PathChange::created(path)),
                        }
                    }
                }
                WatchEventKind::Renamed => {
                    let Ok([from, to]) = <[PathBuf; 2]>::try_from(event.paths) else {
                        continue;
                    };
                    let Some(t) = tracker else {
                        changes.push(PathChange::moved(from, to));
                        continue;
                    };
                    if !paired.insert(t) {
                        continue;
                    }
                    match open.remove(&t) {
                        Some((slot, _)) => changes[slot] = PathChange::moved(from, to),
                        None => changes.push(PathChange::moved(from, to)),
                    }
                }
                WatchEventKind::RenamedAny => {
                    for path in event.paths {
                        if path.exists() {
                            changes.push(PathChange::created(path));
                        } else {
                            changes.push(PathChange::deleted(path));
                        }
                    }
                }
                WatchEventKind::Other => {}
            }
        }

        changes.dedup();
        changes
    }
}
