//! Folder watcher implementation.

use folder_config::{BatchReport, PathChange, TargetHost, TreeSynchronizer};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::WatcherSettings;
use crate::error::{Result, WatcherError};
use crate::event::{EventBatch, WatchEvent};

/// Watches a folder hierarchy and hands out debounced batches of changes.
pub struct FolderWatcher {
    settings: WatcherSettings,

    /// Internal notify watcher.
    watcher: Option<RecommendedWatcher>,

    /// Receiving end of the notify callback's channel.
    event_rx: Option<mpsc::Receiver<WatchEvent>>,

    /// Batch still collecting events.
    pending: Option<EventBatch>,
}

impl FolderWatcher {
    /// Create a watcher for an existing root. Call [`FolderWatcher::start`]
    /// to begin receiving events.
    pub fn new(settings: WatcherSettings) -> Result<Self> {
        settings.validate()?;
        if !settings.root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(settings.root));
        }

        Ok(Self {
            settings,
            watcher: None,
            event_rx: None,
            pending: None,
        })
    }

    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Start watching the root recursively.
    pub fn start(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(()); // Already running
        }

        let (event_tx, event_rx) = mpsc::channel(self.settings.channel_capacity);
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = event_tx.blocking_send(WatchEvent::from(event)) {
                        error!("Failed to send watch event: {e}");
                    }
                }
                Err(e) => {
                    error!("Watch error: {e}");
                }
            },
        )?;
        watcher.watch(&self.settings.root, RecursiveMode::Recursive)?;

        self.watcher = Some(watcher);
        self.event_rx = Some(event_rx);
        info!("Folder watcher started on {}", self.settings.root.display());

        Ok(())
    }

    /// Stop watching. Events already received can still be drained.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.settings.root) {
                warn!("Failed to unwatch {}: {e}", self.settings.root.display());
            }
            info!("Folder watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Wait for the next batch of raw events.
    ///
    /// The batch closes once no event arrived for the debounce window, or
    /// once it holds as many events as the channel.
    ///
    /// Cancel safe: events received by a call that is dropped before its
    /// batch closes open the batch of the next call.
    pub async fn next_batch(&mut self) -> Result<EventBatch> {
        let debounce = self.settings.debounce();
        let limit = self.settings.channel_capacity;
        let event_rx = self.event_rx.as_mut().ok_or(WatcherError::ChannelClosed)?;

        if self.pending.is_none() {
            let first = event_rx.recv().await.ok_or(WatcherError::ChannelClosed)?;
            self.pending.get_or_insert_with(EventBatch::new).push(first);
        }

        while let Some(batch) = self.pending.as_mut() {
            if batch.len() >= limit {
                break;
            }
            match tokio::time::timeout(debounce, event_rx.recv()).await {
                Ok(Some(event)) => batch.push(event),
                Ok(None) | Err(_) => break,
            }
        }

        let batch = self.pending.take().unwrap_or_default();
        debug!("Collected batch of {} watch events", batch.len());
        Ok(batch)
    }

    /// Wait for the next batch and translate it into path changes.
    pub async fn next_changes(&mut self) -> Result<Vec<PathChange>> {
        Ok(self.next_batch().await?.into_changes())
    }

    /// Wait for the next batch and feed it to `sync`.
    pub async fn sync_next<C>(
        &mut self,
        sync: &mut TreeSynchronizer<C>,
        host: &mut dyn TargetHost,
    ) -> Result<BatchReport> {
        let changes = self.next_changes().await?;
        Ok(sync.process_changes(changes, host)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WatchEventKind;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = FolderWatcher::new(WatcherSettings::new(temp_dir.path().join("missing")));
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FolderWatcher::new(WatcherSettings::new(temp_dir.path())).unwrap();
        assert!(!watcher.is_running());

        watcher.start().unwrap();
        assert!(watcher.is_running());
        watcher.start().unwrap();

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_batch_before_start_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FolderWatcher::new(WatcherSettings::new(temp_dir.path())).unwrap();

        let result = watcher.next_batch().await;
        assert!(matches!(result, Err(WatcherError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dropped_call_keeps_received_events() {
        let temp_dir = TempDir::new().unwrap();
        let settings =
            WatcherSettings::new(temp_dir.path()).with_debounce(Duration::from_millis(300));
        let mut watcher = FolderWatcher::new(settings).unwrap();
        let (event_tx, event_rx) = mpsc::channel(16);
        watcher.event_rx = Some(event_rx);

        let first = temp_dir.path().join("a.png");
        let second = temp_dir.path().join("b.png");
        event_tx
            .send(WatchEvent::new(WatchEventKind::Modified, vec![first.clone()]))
            .await
            .unwrap();

        // Dropped inside the debounce window.
        let dropped = tokio::time::timeout(Duration::from_millis(50), watcher.next_batch()).await;
        assert!(dropped.is_err());

        event_tx
            .send(WatchEvent::new(WatchEventKind::Modified, vec![second.clone()]))
            .await
            .unwrap();
        let batch = watcher.next_batch().await.unwrap();

        let paths: Vec<PathBuf> = batch.events.into_iter().flat_map(|e| e.paths).collect();
        assert_eq!(paths, vec![first, second]);
    }
}
