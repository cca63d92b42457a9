//! File watching.
//!
//! [`FileWatcher`] is the boundary between the operating system and Lantern's invalidation
//! logic. Consumers only see the normalized [`WatchEvent`] / [`FileChange`] model, delivered on a
//! `crossbeam_channel` receiver so they can drive it from whatever loop they own.
//!
//! Events are hints: watchers may coalesce, reorder or drop them. A watcher that loses events
//! emits [`WatchEvent::Rescan`] and consumers should treat every watched resource as suspect.
//!
//! The OS backend ([`NotifyFileWatcher`], feature `watch-notify`) is kept out of the default
//! build. Tests should use [`ManualFileWatcher`] rather than real OS timing.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;

use crate::change::FileChange;

/// An event produced by a file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A batch of normalized changes.
    Changes { changes: Vec<FileChange> },
    /// Events were dropped; consumers should revalidate everything they derived from disk.
    Rescan,
}

impl WatchEvent {
    pub fn changes(&self) -> &[FileChange] {
        match self {
            WatchEvent::Changes { changes } => changes,
            WatchEvent::Rescan => &[],
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.changes().iter().flat_map(|change| change.paths())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    Recursive,
    NonRecursive,
}

/// Watchers report asynchronous backend errors on the same stream as events.
pub type WatchMessage = io::Result<WatchEvent>;

pub trait FileWatcher: Send {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()>;

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    fn watch_root(&mut self, root: &Path) -> io::Result<()> {
        self.watch_path(root, WatchMode::Recursive)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage>;

    /// Drains every pending message without blocking.
    fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let mut out = Vec::new();
        for msg in self.receiver().try_iter() {
            out.push(msg?);
        }
        Ok(out)
    }
}

impl<W: ?Sized + FileWatcher> FileWatcher for Box<W> {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        self.as_mut().watch_path(path, mode)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().unwatch_path(path)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        self.as_ref().receiver()
    }
}

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 1024;

/// Deterministic watcher for tests: no OS interaction, events are injected by hand.
///
/// The queue is bounded; injection returns `WouldBlock` when it is full.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    watched: HashMap<PathBuf, WatchMode>,
}

/// Cloneable injector for a [`ManualFileWatcher`] that has been moved elsewhere.
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
}

impl ManualFileWatcherHandle {
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.send(Ok(event))
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.send(Err(error))
    }

    /// Convenience for a single-change batch.
    pub fn push_change(&self, change: FileChange) -> io::Result<()> {
        self.push(WatchEvent::Changes {
            changes: vec![change],
        })
    }

    fn send(&self, msg: WatchMessage) -> io::Result<()> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            watched: HashMap::new(),
        }
    }

    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.handle().push(event)
    }

    /// Currently watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<(PathBuf, WatchMode)> {
        let mut out: Vec<(PathBuf, WatchMode)> =
            self.watched.iter().map(|(p, m)| (p.clone(), *m)).collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        // A recursive watch is never downgraded.
        let mode = match self.watched.get(path) {
            Some(WatchMode::Recursive) => WatchMode::Recursive,
            _ => mode,
        };
        self.watched.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watched.remove(path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}

#[cfg(any(test, feature = "watch-notify"))]
mod notify_impl {
    use super::*;

    use notify::event::{ModifyKind, RenameMode};
    use notify::EventKind;
    use std::collections::VecDeque;

    #[cfg(feature = "watch-notify")]
    use notify::{RecursiveMode, Watcher};
    #[cfg(feature = "watch-notify")]
    use std::sync::atomic::{AtomicBool, Ordering};
    #[cfg(feature = "watch-notify")]
    use std::sync::Arc;

    /// Notify marks lost events with `Flag::Rescan`; some backends send a path-less `Other`.
    pub(super) fn requests_rescan(event: &notify::Event) -> bool {
        matches!(event.attrs.flag(), Some(notify::event::Flag::Rescan))
            || (matches!(event.kind, EventKind::Other) && event.paths.is_empty())
    }

    /// Turns raw notify events into [`FileChange`]s, pairing split renames into moves.
    ///
    /// Unpaired "rename from" halves are bounded; the oldest is reported as deleted when the
    /// bound is exceeded or when the normalizer is flushed.
    #[derive(Debug, Default)]
    pub(super) struct EventNormalizer {
        pending_renames: VecDeque<PathBuf>,
    }

    impl EventNormalizer {
        const MAX_PENDING_RENAMES: usize = 256;

        pub(super) fn push(&mut self, event: notify::Event) -> Vec<FileChange> {
            let mut out = Vec::new();
            match event.kind {
                EventKind::Create(_) => out.extend(
                    event
                        .paths
                        .into_iter()
                        .map(|path| FileChange::Created { path }),
                ),
                EventKind::Remove(_) => out.extend(
                    event
                        .paths
                        .into_iter()
                        .map(|path| FileChange::Deleted { path }),
                ),
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                    let mut paths = event.paths.into_iter();
                    while let Some(from) = paths.next() {
                        match paths.next() {
                            Some(to) => out.push(FileChange::Moved { from, to }),
                            None => out.push(FileChange::Modified { path: from }),
                        }
                    }
                }
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    self.pending_renames.extend(event.paths);
                    while self.pending_renames.len() > Self::MAX_PENDING_RENAMES {
                        if let Some(path) = self.pending_renames.pop_front() {
                            out.push(FileChange::Deleted { path });
                        }
                    }
                }
                EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                    for to in event.paths {
                        match self.pending_renames.pop_front() {
                            Some(from) => out.push(FileChange::Moved { from, to }),
                            None => out.push(FileChange::Created { path: to }),
                        }
                    }
                }
                EventKind::Access(_) => {}
                _ => out.extend(
                    event
                        .paths
                        .into_iter()
                        .map(|path| FileChange::Modified { path }),
                ),
            }
            out
        }

        pub(super) fn flush(&mut self) -> Vec<FileChange> {
            self.pending_renames
                .drain(..)
                .map(|path| FileChange::Deleted { path })
                .collect()
        }

        pub(super) fn has_pending(&self) -> bool {
            !self.pending_renames.is_empty()
        }
    }

    #[cfg(feature = "watch-notify")]
    const RAW_QUEUE_CAPACITY: usize = 4096;
    #[cfg(feature = "watch-notify")]
    const EVENTS_QUEUE_CAPACITY: usize = 1024;
    #[cfg(feature = "watch-notify")]
    const RENAME_PAIRING_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

    #[cfg(feature = "watch-notify")]
    fn drain_loop(
        raw_rx: channel::Receiver<notify::Result<notify::Event>>,
        events_tx: channel::Sender<WatchMessage>,
        stop_rx: channel::Receiver<()>,
        overflowed: Arc<AtomicBool>,
    ) {
        let mut normalizer = EventNormalizer::default();
        let send = |msg: WatchMessage, overflowed: &AtomicBool| -> bool {
            match events_tx.try_send(msg) {
                Ok(()) => true,
                Err(channel::TrySendError::Full(_)) => {
                    overflowed.store(true, Ordering::Release);
                    true
                }
                Err(channel::TrySendError::Disconnected(_)) => false,
            }
        };

        loop {
            if overflowed.swap(false, Ordering::AcqRel) {
                normalizer = EventNormalizer::default();
                while raw_rx.try_recv().is_ok() {}
                tracing::debug!(target = "lantern.vfs", "watch queue overflowed; requesting rescan");
                if !send(Ok(WatchEvent::Rescan), &overflowed) {
                    break;
                }
            }

            let tick = if normalizer.has_pending() {
                channel::after(RENAME_PAIRING_WINDOW)
            } else {
                channel::never()
            };

            channel::select! {
                recv(stop_rx) -> _ => break,
                recv(raw_rx) -> msg => {
                    let Ok(res) = msg else {
                        break;
                    };
                    let keep_going = match res {
                        Ok(event) if requests_rescan(&event) => {
                            overflowed.store(true, Ordering::Release);
                            true
                        }
                        Ok(event) => {
                            let changes = normalizer.push(event);
                            changes.is_empty() || send(Ok(WatchEvent::Changes { changes }), &overflowed)
                        }
                        Err(err) => {
                            // Backends report lost events as errors too.
                            overflowed.store(true, Ordering::Release);
                            send(Err(io::Error::other(err)), &overflowed)
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
                recv(tick) -> _ => {
                    let changes = normalizer.flush();
                    if !changes.is_empty() && !send(Ok(WatchEvent::Changes { changes }), &overflowed) {
                        break;
                    }
                }
            }
        }

        let changes = normalizer.flush();
        if !changes.is_empty() {
            let _ = events_tx.try_send(Ok(WatchEvent::Changes { changes }));
        }
    }

    /// [`FileWatcher`] backed by the `notify` crate.
    ///
    /// Raw events flow through a bounded queue into a drain thread that normalizes them; if
    /// either queue overflows, the backlog is discarded and a [`WatchEvent::Rescan`] is emitted.
    #[cfg(feature = "watch-notify")]
    pub struct NotifyFileWatcher {
        watcher: notify::RecommendedWatcher,
        events_rx: channel::Receiver<WatchMessage>,
        stop_tx: channel::Sender<()>,
        thread: Option<std::thread::JoinHandle<()>>,
        watched: HashMap<PathBuf, WatchMode>,
    }

    #[cfg(feature = "watch-notify")]
    impl NotifyFileWatcher {
        pub fn new() -> io::Result<Self> {
            let (raw_tx, raw_rx) = channel::bounded::<notify::Result<notify::Event>>(RAW_QUEUE_CAPACITY);
            let (events_tx, events_rx) = channel::bounded::<WatchMessage>(EVENTS_QUEUE_CAPACITY);
            let (stop_tx, stop_rx) = channel::bounded::<()>(1);
            let overflowed = Arc::new(AtomicBool::new(false));

            let overflowed_cb = Arc::clone(&overflowed);
            let watcher = notify::recommended_watcher(move |res| {
                if let Err(channel::TrySendError::Full(_)) = raw_tx.try_send(res) {
                    overflowed_cb.store(true, Ordering::Release);
                }
            })
            .map_err(io::Error::other)?;

            let thread = std::thread::Builder::new()
                .name("lantern-watch".into())
                .spawn(move || drain_loop(raw_rx, events_tx, stop_rx, overflowed))?;

            Ok(Self {
                watcher,
                events_rx,
                stop_tx,
                thread: Some(thread),
                watched: HashMap::new(),
            })
        }
    }

    #[cfg(feature = "watch-notify")]
    impl Drop for NotifyFileWatcher {
        fn drop(&mut self) {
            let _ = self.stop_tx.try_send(());
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    tracing::debug!(target = "lantern.vfs", "file watcher drain thread panicked");
                }
            }
        }
    }

    #[cfg(feature = "watch-notify")]
    impl FileWatcher for NotifyFileWatcher {
        fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
            let mode = if path.is_file() {
                WatchMode::NonRecursive
            } else {
                mode
            };
            let mode = match self.watched.get(path) {
                Some(WatchMode::Recursive) => return Ok(()),
                Some(WatchMode::NonRecursive) if mode == WatchMode::NonRecursive => return Ok(()),
                Some(WatchMode::NonRecursive) => {
                    self.watcher.unwatch(path).map_err(io::Error::other)?;
                    mode
                }
                None => mode,
            };
            let recursive = match mode {
                WatchMode::Recursive => RecursiveMode::Recursive,
                WatchMode::NonRecursive => RecursiveMode::NonRecursive,
            };
            self.watcher
                .watch(path, recursive)
                .map_err(io::Error::other)?;
            self.watched.insert(path.to_path_buf(), mode);
            Ok(())
        }

        fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
            if self.watched.remove(path).is_some() {
                self.watcher.unwatch(path).map_err(io::Error::other)?;
            }
            Ok(())
        }

        fn receiver(&self) -> &channel::Receiver<WatchMessage> {
            &self.events_rx
        }
    }

}

#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;
