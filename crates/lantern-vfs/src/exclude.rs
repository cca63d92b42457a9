use std::path::{Component, Path};

/// Directory names whose contents never influence cached results: version control metadata,
/// dependency trees and build output.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "build",
    "out",
    "bin",
    ".gradle",
];

/// Drops watcher events for paths inside excluded directories.
///
/// A path is excluded if any of its directory components equals one of the configured names.
/// The file name itself is not considered, so a file called `build` is still watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeFilter {
    dirs: Vec<String>,
}

impl Default for ExcludeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_DIRS.iter().copied())
    }
}

impl ExcludeFilter {
    pub fn new<I, S>(dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dirs: dirs
                .into_iter()
                .map(Into::into)
                .filter(|dir: &String| !dir.is_empty())
                .collect(),
        }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        parent.components().any(|component| match component {
            Component::Normal(name) => self.dirs.iter().any(|dir| name == dir.as_str()),
            _ => false,
        })
    }
}
