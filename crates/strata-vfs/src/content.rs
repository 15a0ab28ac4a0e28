use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_core::FileId;

/// Input handed to an index extension's mapping function.
///
/// Content-less indices receive an empty byte payload; they index on the file
/// path alone.
#[derive(Debug, Clone)]
pub struct FileContent {
    file: FileId,
    path: PathBuf,
    bytes: Arc<Vec<u8>>,
}

impl FileContent {
    pub fn new(file: FileId, path: PathBuf, bytes: Arc<Vec<u8>>) -> Self {
        Self { file, path, bytes }
    }

    /// Content for indices that do not depend on file content.
    pub fn without_bytes(file: FileId, path: PathBuf) -> Self {
        Self {
            file,
            path,
            bytes: Arc::new(Vec::new()),
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}
