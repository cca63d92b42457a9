//! File-system change events for Lantern: the normalized change model, the [`FileWatcher`]
//! abstraction, and the directory exclusion filter applied before any cache work.

mod change;
mod exclude;
mod watch;

pub use change::{FileChange, FileChangeKind};
pub use exclude::{ExcludeFilter, DEFAULT_EXCLUDED_DIRS};
#[cfg(feature = "watch-notify")]
pub use watch::NotifyFileWatcher;
pub use watch::{
    FileWatcher, ManualFileWatcher, ManualFileWatcherHandle, WatchEvent, WatchMessage, WatchMode,
};
