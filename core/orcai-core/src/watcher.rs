//! File change watcher adapter.
//!
//! The filesystem notification backend is reduced to one callback contract,
//! [`FileEventSink::on_file_event`]. `notify` delivers events on its own thread; we forward
//! them over a channel to a dedicated drain thread so the sink is only ever called from one
//! place, and stopping the watch means joining that thread.

use crate::error::{OrcaiError, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Receives mutation notifications. Called from the watcher's drain thread.
pub trait FileEventSink: Send + Sync {
    fn on_file_event(&self, path: &Path, is_directory: bool);

    fn on_watch_error(&self, _details: &str) {}
}

/// Something that can subscribe a sink to a directory tree.
pub trait WatchBackend: Send + Sync {
    fn start(&self, root: &Path, sink: Arc<dyn FileEventSink>) -> Result<Box<dyn ActiveWatch>>;
}

/// A running subscription.
pub trait ActiveWatch: Send {
    /// Stops the subscription. Returns only once no further sink calls can happen.
    fn stop(self: Box<Self>);
}

/// Recursive watch backed by the platform's recommended `notify` watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn start(&self, root: &Path, sink: Arc<dyn FileEventSink>) -> Result<Box<dyn ActiveWatch>> {
        let watch_failed = |details: String| OrcaiError::WatchFailed {
            root: root.to_path_buf(),
            details,
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            })
            .map_err(|e| watch_failed(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| watch_failed(e.to_string()))?;

        let worker = thread::Builder::new()
            .name("orcai-watch".to_string())
            .spawn(move || drain_events(rx, sink))
            .map_err(|e| watch_failed(e.to_string()))?;

        debug!(root = %root.display(), "File watcher started");
        Ok(Box::new(NotifyWatch {
            root: root.to_path_buf(),
            watcher,
            worker,
        }))
    }
}

struct NotifyWatch {
    root: PathBuf,
    watcher: RecommendedWatcher,
    worker: JoinHandle<()>,
}

impl ActiveWatch for NotifyWatch {
    fn stop(self: Box<Self>) {
        let NotifyWatch {
            root,
            watcher,
            worker,
        } = *self;

        // Dropping the watcher shuts down notify's event loop, which drops the channel
        // sender; the drain thread then sees a disconnect and exits.
        drop(watcher);
        if worker.join().is_err() {
            warn!(root = %root.display(), "File watcher drain thread panicked");
        }
        debug!(root = %root.display(), "File watcher stopped");
    }
}

fn drain_events(rx: mpsc::Receiver<notify::Result<Event>>, sink: Arc<dyn FileEventSink>) {
    for res in rx {
        match res {
            Ok(event) if is_mutation(&event.kind) => {
                for path in &event.paths {
                    sink.on_file_event(path, path.is_dir());
                }
            }
            Ok(_) => {}
            Err(err) => sink.on_watch_error(&err.to_string()),
        }
    }
}

/// Content changes, plus creations and rename targets so files written via
/// create-then-rename still get a baseline.
fn is_mutation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Both))
            | EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
    )
}
