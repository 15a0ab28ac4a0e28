use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use strata_core::FileId;
use strata_vfs::FileMeta;

/// Restricts which files a query observes.
#[derive(Clone)]
pub enum SearchScope {
    Everything,
    Files(HashSet<FileId>),
    Predicate(Arc<dyn Fn(&FileMeta) -> bool + Send + Sync>),
}

impl SearchScope {
    pub fn single_file(file: FileId) -> Self {
        SearchScope::Files([file].into_iter().collect())
    }

    pub fn accepts(&self, meta: &FileMeta) -> bool {
        match self {
            SearchScope::Everything => true,
            SearchScope::Files(files) => files.contains(&meta.id),
            SearchScope::Predicate(predicate) => predicate(meta),
        }
    }
}

impl fmt::Debug for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::Everything => f.write_str("SearchScope::Everything"),
            SearchScope::Files(files) => f.debug_tuple("SearchScope::Files").field(files).finish(),
            SearchScope::Predicate(_) => f.write_str("SearchScope::Predicate(..)"),
        }
    }
}

/// A set of indexable files registered by the host, usually one per project
/// content root.
pub trait IndexableFileSet: Send + Sync {
    fn contains(&self, file: &FileMeta) -> bool;
}

/// Indexable set accepting everything under one root path.
#[derive(Debug, Clone)]
pub struct PathPrefixSet {
    root: PathBuf,
}

impl PathPrefixSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IndexableFileSet for PathPrefixSet {
    fn contains(&self, file: &FileMeta) -> bool {
        file.path.starts_with(&self.root)
    }
}
