use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use strata_core::{DocumentId, FileId};

/// Metadata snapshot for a single file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub id: FileId,
    pub path: PathBuf,
    pub is_directory: bool,
    pub len: u64,
    /// `false` once the file has been deleted. Ids are never reused, so stale
    /// ids resolve to invalid metadata rather than to another file.
    pub valid: bool,
}

/// Id-addressed view of the host's file hierarchy.
///
/// The engine references files exclusively through their stable [`FileId`]s;
/// path resolution and id assignment belong to the host.
pub trait FileTree: Send + Sync {
    fn meta(&self, file: FileId) -> Option<FileMeta>;

    /// Reads the on-disk content of `file` (in-editor buffers are not
    /// consulted here; see [`DocumentStore`]).
    fn read(&self, file: FileId) -> io::Result<Arc<Vec<u8>>>;

    fn children(&self, dir: FileId) -> Vec<FileId>;

    /// Whether the children of `dir` have ever been enumerated. Directories
    /// whose children were never observed cannot have indexed descendants, so
    /// invalidation skips them.
    fn were_children_observed(&self, dir: FileId) -> bool;

    /// Visits every valid non-directory file; stops when the visitor returns
    /// `false`.
    fn iter_files(&self, f: &mut dyn FnMut(FileId) -> bool);
}

/// An open editor buffer whose text differs from the file on disk.
#[derive(Debug, Clone)]
pub struct UnsavedDocument {
    pub document: DocumentId,
    pub file: FileId,
    /// Monotonic per-document modification stamp.
    pub stamp: u64,
    pub text: Arc<String>,
}

/// Source of in-editor buffers queried at the index boundary.
pub trait DocumentStore: Send + Sync {
    /// Documents whose buffer currently differs from disk.
    fn unsaved_documents(&self) -> Vec<UnsavedDocument>;
}
