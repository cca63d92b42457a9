//! Cache invalidation driven by file-system events.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;
use lantern_core::DocumentKey;
use lantern_vfs::{ExcludeFilter, FileChange, FileWatcher, WatchEvent};
use tokio::runtime::Handle;

use crate::{ImportCache, InspectionCache};

/// Applies watcher events to the import and inspection caches.
pub struct InvalidationSource {
    imports: Arc<ImportCache>,
    inspections: Arc<InspectionCache>,
    exclude: ExcludeFilter,
    watch_only_cached: bool,
}

impl InvalidationSource {
    pub fn new(
        imports: Arc<ImportCache>,
        inspections: Arc<InspectionCache>,
        exclude: ExcludeFilter,
        watch_only_cached: bool,
    ) -> Self {
        Self {
            imports,
            inspections,
            exclude,
            watch_only_cached,
        }
    }

    /// Applies one event. Returns the number of import entries dropped.
    pub async fn apply(&self, event: &WatchEvent) -> usize {
        let changes = match event {
            WatchEvent::Rescan => {
                let dropped = self.imports.len();
                self.imports.clear();
                tracing::debug!(target = "lantern.assist", dropped, "rescan requested; cleared import cache");
                return dropped;
            }
            WatchEvent::Changes { changes } => changes,
        };

        let mut dropped = 0;
        for change in changes {
            match change {
                FileChange::Deleted { path } => {
                    if self.drop_resource(path) {
                        dropped += 1;
                    }
                }
                FileChange::Moved { from, to } => {
                    if self.drop_resource(from) {
                        dropped += 1;
                    }
                    // A rename over an existing file replaces its content.
                    if self.exclude.is_excluded(to) {
                        continue;
                    }
                    self.inspections.invalidate_document(&DocumentKey::from_path(to));
                    if self.content_changed(to).await {
                        dropped += 1;
                    }
                }
                FileChange::Created { path } | FileChange::Modified { path } => {
                    if self.exclude.is_excluded(path) {
                        continue;
                    }
                    if self.content_changed(path).await {
                        dropped += 1;
                    }
                }
            }
        }
        dropped
    }

    fn drop_resource(&self, path: &Path) -> bool {
        if self.exclude.is_excluded(path) {
            return false;
        }
        self.inspections.invalidate_document(&DocumentKey::from_path(path));
        self.imports.invalidate(path)
    }

    async fn content_changed(&self, path: &Path) -> bool {
        if self.watch_only_cached {
            // Only resources with an entry are touched.
            return self.imports.invalidate(path);
        }
        self.imports.revalidate(path).await
    }

    /// Starts a thread feeding `watcher` events into [`InvalidationSource::apply`] on
    /// `runtime`.
    ///
    /// The runtime must be driven by other threads (a multi-threaded runtime), since the pump
    /// blocks on it.
    pub fn spawn<W>(self: Arc<Self>, watcher: W, runtime: Handle) -> io::Result<InvalidationHandle>
    where
        W: FileWatcher + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("lantern-invalidation".to_string())
            .spawn(move || pump(self, watcher, stop_rx, runtime))?;
        Ok(InvalidationHandle {
            stop_tx,
            thread: Some(thread),
        })
    }
}

fn pump<W: FileWatcher>(
    source: Arc<InvalidationSource>,
    watcher: W,
    stop_rx: channel::Receiver<()>,
    runtime: Handle,
) {
    let events = watcher.receiver();
    loop {
        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(events) -> msg => {
                let Ok(msg) = msg else {
                    break;
                };
                match msg {
                    Ok(event) => {
                        let dropped = runtime.block_on(source.apply(&event));
                        tracing::trace!(target = "lantern.assist", dropped, "applied watch event");
                    }
                    Err(err) => {
                        tracing::warn!(target = "lantern.assist", error = %err, "file watcher error");
                    }
                }
            }
        }
    }
    tracing::debug!(target = "lantern.assist", "invalidation pump stopped");
}

/// Owner of an invalidation pump thread. Stopping (or dropping) the handle ends it.
#[derive(Debug)]
pub struct InvalidationHandle {
    stop_tx: channel::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl InvalidationHandle {
    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::debug!(target = "lantern.assist", "invalidation pump panicked");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.thread.is_none()
    }
}

impl Drop for InvalidationHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
