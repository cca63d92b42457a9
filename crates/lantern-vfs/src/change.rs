use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A normalized file-system change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Deleted { path: PathBuf },
    Moved { from: PathBuf, to: PathBuf },
}

impl FileChange {
    pub fn kind(&self) -> FileChangeKind {
        match self {
            FileChange::Created { .. } => FileChangeKind::Created,
            FileChange::Modified { .. } => FileChangeKind::Modified,
            FileChange::Deleted { .. } => FileChangeKind::Deleted,
            FileChange::Moved { .. } => FileChangeKind::Moved,
        }
    }

    /// Every path touched by this change; both ends for a move.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        let (first, second) = match self {
            FileChange::Created { path }
            | FileChange::Modified { path }
            | FileChange::Deleted { path } => (path.as_path(), None),
            FileChange::Moved { from, to } => (from.as_path(), Some(to.as_path())),
        };
        std::iter::once(first).chain(second)
    }
}
