//! File system watcher for a plugin directory
//!
//! Funnels the platform's change notifications (created, deleted, modified,
//! renamed) into two semantic events, [`ModuleEvent::Added`] and
//! [`ModuleEvent::Removed`]. A modification is reported as `Removed`
//! immediately followed by `Added` for the same path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Semantic change to one path in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    /// A file appeared at this path, or its content was replaced
    Added(PathBuf),
    /// The file at this path is gone, or is about to be replaced
    Removed(PathBuf),
}

impl ModuleEvent {
    pub fn path(&self) -> &Path {
        match self {
            ModuleEvent::Added(path) | ModuleEvent::Removed(path) => path,
        }
    }
}

/// Raw notification kinds, as delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChange {
    /// File content was written in place
    ContentChanged(PathBuf),
    /// File created
    Created(PathBuf),
    /// File deleted
    Deleted(PathBuf),
    /// File renamed within the directory
    Renamed { from: PathBuf, to: PathBuf },
}

impl RawChange {
    /// Translate one `notify` event into raw changes.
    ///
    /// Access and metadata-only events produce nothing. A rename arrives as
    /// its two halves, a deletion of the old name and a creation of the new
    /// one; the combined `Both` notification that some backends send after
    /// the halves is dropped so each rename is reported once.
    pub fn from_notify(event: &Event) -> Vec<RawChange> {
        let paths = event.paths.iter().cloned();
        match event.kind {
            EventKind::Create(_) => paths.map(RawChange::Created).collect(),
            EventKind::Remove(_) => paths.map(RawChange::Deleted).collect(),
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                paths.map(RawChange::ContentChanged).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(RawChange::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(RawChange::Created).collect()
            }
            // Backends that can't tell which half of a rename this is.
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .map(|path| {
                    if path.exists() {
                        RawChange::Created(path)
                    } else {
                        RawChange::Deleted(path)
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The semantic events for this change, in emission order.
    pub fn coalesce(self) -> Vec<ModuleEvent> {
        match self {
            RawChange::Created(path) => vec![ModuleEvent::Added(path)],
            RawChange::Deleted(path) => vec![ModuleEvent::Removed(path)],
            RawChange::ContentChanged(path) => {
                vec![ModuleEvent::Removed(path.clone()), ModuleEvent::Added(path)]
            }
            RawChange::Renamed { from, to } => {
                vec![ModuleEvent::Removed(from), ModuleEvent::Added(to)]
            }
        }
    }
}

/// Watch error types
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Watch path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches one directory and emits [`ModuleEvent`]s on a channel.
///
/// Events are sent from the platform watcher's delivery thread in the order
/// the platform reported them. There is no debouncing: a burst of writes
/// yields a burst of `Removed`/`Added` pairs.
pub struct ChangeCoalescer {
    /// Watched directory
    directory: PathBuf,
    /// Internal watcher handle, `None` after shutdown
    watcher: Option<RecommendedWatcher>,
    /// Taken on shutdown; the delivery callback sends while holding the lock
    sender: Arc<Mutex<Option<Sender<ModuleEvent>>>>,
    /// Event receiver (taken by consumer)
    event_rx: Option<Receiver<ModuleEvent>>,
}

impl ChangeCoalescer {
    /// Start watching `directory` (non-recursively).
    pub fn watch<P: AsRef<Path>>(directory: P) -> Result<Self, WatchError> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(WatchError::NotADirectory(directory));
        }

        let (event_tx, event_rx) = unbounded();
        let sender = Arc::new(Mutex::new(Some(event_tx)));
        let delivering = sender.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let guard = delivering.lock();
                let Some(event_tx) = guard.as_ref() else {
                    return;
                };
                match result {
                    Ok(event) => {
                        for change in RawChange::from_notify(&event) {
                            for module_event in change.coalesce() {
                                debug!("Module event: {:?}", module_event);
                                if event_tx.send(module_event).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => warn!("Watch error: {}", e),
                }
            },
            Config::default(),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!("Watching plugin directory: {:?}", directory);

        Ok(Self {
            directory,
            watcher: Some(watcher),
            sender,
            event_rx: Some(event_rx),
        })
    }

    /// Take the event receiver (can only be called once)
    pub fn take_receiver(&mut self) -> Option<Receiver<ModuleEvent>> {
        self.event_rx.take()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_active(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Release the watch. No event is emitted after this returns.
    pub fn shutdown(&mut self) {
        // Any callback still delivering finishes before the sender goes away.
        drop(self.sender.lock().take());
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.directory) {
                debug!("Unwatch {:?} failed: {}", self.directory, e);
            }
            info!("Stopped watching plugin directory: {:?}", self.directory);
        }
    }
}

impl Drop for ChangeCoalescer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
