use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use strata_core::{DocumentId, FileId};
use strata_storage::StorageError;
use strata_vfs::{DocumentStore, FileContent, FileTree};

use crate::memory_overlay::BufferingListener;
use crate::registry::IndexRegistry;
use crate::scope::SearchScope;

/// Makes unsaved editor buffers observable through index queries.
///
/// For every stale unsaved document in scope, the document text is re-run
/// through the extension's indexer into the memory overlay (buffering mode
/// on), so the persistent maps never see editor content. Per-(document,
/// index) stamps avoid re-indexing an unchanged buffer on every query; the
/// stamps are dropped whenever the corresponding overlay is cleared.
pub(crate) struct UnsavedDocumentsOverlay {
    documents: Arc<dyn DocumentStore>,
    /// Documents with an open host transaction, under their own lock.
    transactions: Mutex<HashMap<DocumentId, FileId>>,
    indexed: Mutex<HashMap<(DocumentId, String), u64>>,
}

impl UnsavedDocumentsOverlay {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            transactions: Mutex::new(HashMap::new()),
            indexed: Mutex::new(HashMap::new()),
        }
    }

    pub fn transaction_started(&self, document: DocumentId, file: FileId) {
        self.transactions.lock().insert(document, file);
        self.invalidate_up_to_date();
    }

    pub fn transaction_completed(&self, document: DocumentId) {
        self.transactions.lock().remove(&document);
    }

    /// Forgets every up-to-date mark so the next query re-indexes buffers.
    pub fn invalidate_up_to_date(&self) {
        self.indexed.lock().clear();
    }

    pub fn drop_index_marks(&self, name: &str) {
        self.indexed.lock().retain(|(_, n), _| n != name);
    }

    pub fn index_unsaved_documents(
        &self,
        registry: &IndexRegistry,
        tree: &dyn FileTree,
        name: &str,
        filter: Option<&SearchScope>,
        restricted: Option<FileId>,
    ) -> Result<(), StorageError> {
        let Some(entry) = registry.entry(name) else {
            return Ok(());
        };
        let documents = self.documents.unsaved_documents();
        if documents.is_empty() {
            return Ok(());
        }

        for doc in documents {
            if let Some(restricted) = restricted {
                if restricted != doc.file {
                    continue;
                }
            }
            let Some(meta) = tree.meta(doc.file) else {
                continue;
            };
            if !meta.valid || !entry.index.accept_input(&meta) {
                continue;
            }
            if restricted.is_none() {
                if let Some(scope) = filter {
                    if !scope.accepts(&meta) {
                        continue;
                    }
                }
            }
            let mark = (doc.document, name.to_string());
            if self.indexed.lock().get(&mark) == Some(&doc.stamp) {
                continue;
            }

            let content = FileContent::new(
                doc.file,
                meta.path.clone(),
                Arc::new(doc.text.as_bytes().to_vec()),
            );
            entry.index.set_buffering(true);
            entry.index.update(doc.file, Some(&content))?;
            self.indexed.lock().insert(mark, doc.stamp);
        }
        Ok(())
    }
}

/// Drops one index's up-to-date marks when its memory overlay is discarded,
/// so the next query re-indexes the buffers that were lost with it.
pub(crate) struct UnsavedMarksInvalidator {
    name: String,
    overlay: Arc<UnsavedDocumentsOverlay>,
}

impl UnsavedMarksInvalidator {
    pub fn new(name: String, overlay: Arc<UnsavedDocumentsOverlay>) -> Self {
        Self { name, overlay }
    }
}

impl BufferingListener for UnsavedMarksInvalidator {
    fn buffering_state_changed(&self, _enabled: bool) {}

    fn memory_storage_cleared(&self) {
        self.overlay.drop_index_marks(&self.name);
    }
}
