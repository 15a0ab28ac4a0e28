use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use strata_core::{Cancelled, FileId};
use strata_storage::{StorageError, VersionedStore};
use strata_vfs::{FileContent, FileMeta};

use crate::extension::IndexKey;
use crate::host::IndexHost;
use crate::stamp::{IndexingStamp, UNINDEXED_STAMP};
use crate::updatable_index::UpdatableIndex;

/// Per-index rebuild state. Transitions are atomic CAS only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RebuildStatus {
    Ok = 0,
    RequiresRebuild = 1,
    RebuildInProgress = 2,
}

impl RebuildStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RebuildStatus::Ok,
            1 => RebuildStatus::RequiresRebuild,
            _ => RebuildStatus::RebuildInProgress,
        }
    }
}

pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(RebuildStatus::Ok as u8))
    }

    pub fn get(&self) -> RebuildStatus {
        RebuildStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, status: RebuildStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    /// Single-winner transition.
    pub fn transition(&self, from: RebuildStatus, to: RebuildStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Type-erased operations the registry needs from every index regardless of
/// its key/value types.
pub(crate) trait AnyIndex: Send + Sync {
    fn update(&self, input: FileId, content: Option<&FileContent>) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
    fn flush(&self) -> Result<(), StorageError>;
    fn dispose(&self) -> Result<(), StorageError>;
    fn set_buffering(&self, enabled: bool);
    fn accept_input(&self, file: &FileMeta) -> bool;
    fn depends_on_file_content(&self) -> bool;
    fn size_limit_exempt(&self, file: &FileMeta) -> bool;
}

impl<K, V> AnyIndex for UpdatableIndex<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Clone + Send + Sync + 'static,
{
    fn update(&self, input: FileId, content: Option<&FileContent>) -> Result<(), StorageError> {
        UpdatableIndex::update(self, input, content)
    }

    fn clear(&self) -> Result<(), StorageError> {
        UpdatableIndex::clear(self)
    }

    fn flush(&self) -> Result<(), StorageError> {
        UpdatableIndex::flush(self)
    }

    fn dispose(&self) -> Result<(), StorageError> {
        UpdatableIndex::dispose(self)
    }

    fn set_buffering(&self, enabled: bool) {
        UpdatableIndex::set_buffering(self, enabled)
    }

    fn accept_input(&self, file: &FileMeta) -> bool {
        self.extension().accept_input(file)
    }

    fn depends_on_file_content(&self) -> bool {
        self.extension().depends_on_file_content()
    }

    fn size_limit_exempt(&self, file: &FileMeta) -> bool {
        self.extension().size_limit_exempt(file)
    }
}

pub(crate) struct IndexEntry {
    pub index: Arc<dyn AnyIndex>,
    /// The same index object, kept as `Any` for typed downcasts at the query
    /// boundary.
    pub typed: Arc<dyn Any + Send + Sync>,
    pub version: u32,
    pub creation_stamp: AtomicI64,
    pub status: StatusCell,
    pub stamps: IndexingStamp,
}

/// Owns every registered index together with its rebuild status and stamps.
pub struct IndexRegistry {
    store: VersionedStore,
    entries: HashMap<String, IndexEntry>,
    content_less: Vec<String>,
    content_requiring: Vec<String>,
    local_mod_count: AtomicU64,
    host: Arc<dyn IndexHost>,
}

impl IndexRegistry {
    pub(crate) fn new(
        store: VersionedStore,
        entries: HashMap<String, IndexEntry>,
        host: Arc<dyn IndexHost>,
    ) -> Self {
        let mut content_less = Vec::new();
        let mut content_requiring = Vec::new();
        for (name, entry) in &entries {
            if entry.index.depends_on_file_content() {
                content_requiring.push(name.clone());
            } else {
                content_less.push(name.clone());
            }
        }
        Self {
            store,
            entries,
            content_less,
            content_requiring,
            local_mod_count: AtomicU64::new(0),
            host,
        }
    }

    pub(crate) fn store(&self) -> &VersionedStore {
        &self.store
    }

    pub(crate) fn entry(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn content_less_names(&self) -> &[String] {
        &self.content_less
    }

    pub(crate) fn content_requiring_names(&self) -> &[String] {
        &self.content_requiring
    }

    pub fn rebuild_status(&self, name: &str) -> Option<RebuildStatus> {
        Some(self.entries.get(name)?.status.get())
    }

    pub fn mod_count(&self) -> u64 {
        self.local_mod_count.load(Ordering::SeqCst)
    }

    pub(crate) fn typed_index<K, V>(
        &self,
        key: &IndexKey<K, V>,
    ) -> Option<Arc<UpdatableIndex<K, V>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let entry = self.entries.get(key.name())?;
        entry.typed.clone().downcast::<UpdatableIndex<K, V>>().ok()
    }

    /// Applies one file's (re)computed data to one index and records the
    /// indexing stamp: the creation stamp with content, the "unindexed"
    /// sentinel without.
    pub(crate) fn update_single_index(
        &self,
        name: &str,
        file: FileId,
        content: Option<&FileContent>,
    ) -> Result<(), StorageError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(());
        };
        if entry.status.get() == RebuildStatus::RequiresRebuild {
            // The index is scheduled for rebuild, no need to update.
            return Ok(());
        }
        self.local_mod_count.fetch_add(1, Ordering::SeqCst);

        entry.index.set_buffering(false);
        entry.index.update(file, content)?;

        let stamp = if content.is_some() {
            entry.creation_stamp.load(Ordering::SeqCst)
        } else {
            UNINDEXED_STAMP
        };
        entry.stamps.set(file, stamp)
    }

    pub fn request_rebuild(&self, name: &str) {
        let Some(entry) = self.entries.get(name) else {
            return;
        };
        tracing::info!(target = "strata.engine", index = name, "rebuild requested");
        entry.status.set(RebuildStatus::RequiresRebuild);
    }

    /// Logs `cause`, flags the index for rebuild and attempts the rebuild
    /// right away, swallowing `Cancelled`.
    pub(crate) fn schedule_rebuild(&self, name: &str, cause: &dyn std::fmt::Display) {
        tracing::warn!(
            target = "strata.engine",
            index = name,
            cause = %cause,
            "scheduling index rebuild after storage failure"
        );
        self.request_rebuild(name);
        let _ = self.check_rebuild(name, false);
    }

    /// Clears the index if a rebuild is pending (single CAS winner). While a
    /// rebuild is in progress every caller observes `Cancelled`.
    pub(crate) fn check_rebuild(&self, name: &str, cleanup_only: bool) -> Result<(), Cancelled> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(());
        };
        if entry.status.get() == RebuildStatus::Ok {
            return Ok(());
        }

        if entry
            .status
            .transition(RebuildStatus::RequiresRebuild, RebuildStatus::RebuildInProgress)
        {
            match self.clear_index(name) {
                Ok(()) => {
                    if !cleanup_only {
                        self.host.schedule_index_rescan();
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target = "strata.engine",
                        index = name,
                        error = %err,
                        "index rebuild failed; will retry"
                    );
                    entry.status.set(RebuildStatus::RequiresRebuild);
                }
            }
            entry
                .status
                .transition(RebuildStatus::RebuildInProgress, RebuildStatus::Ok);
        }

        if entry.status.get() == RebuildStatus::RebuildInProgress {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Wipes the index data and refreshes the creation stamp so every file
    /// becomes stale.
    pub(crate) fn clear_index(&self, name: &str) -> Result<(), StorageError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(());
        };
        entry.index.clear()?;
        entry.stamps.clear()?;
        self.store.rewrite_version(name, entry.version)?;
        entry
            .creation_stamp
            .store(self.store.creation_stamp(name)?, Ordering::SeqCst);
        Ok(())
    }

    /// Flushes every index unless the engine is busy: bails out as soon as a
    /// heavy process starts or the modification counter moves past
    /// `expected_mod_count`.
    pub(crate) fn flush_all(&self, expected_mod_count: u64) {
        for (name, entry) in &self.entries {
            if self.host.is_heavy_process_running() || self.mod_count() != expected_mod_count {
                return;
            }
            if let Err(err) = entry.index.flush() {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "index flush failed"
                );
                self.request_rebuild(name);
            }
            if let Err(err) = entry.stamps.flush() {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "stamp flush failed"
                );
            }
        }
    }

    /// The file is an input and its stamp is stale: it must be (re)indexed.
    pub(crate) fn should_index_file(&self, name: &str, file: &FileMeta) -> bool {
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        entry.index.accept_input(file)
            && !entry
                .stamps
                .is_current(file.id, entry.creation_stamp.load(Ordering::SeqCst))
    }

    /// The file is an input and currently indexed: its stored data must be
    /// invalidated when the file changes.
    pub(crate) fn should_update_index(&self, name: &str, file: &FileMeta) -> bool {
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        entry.index.accept_input(file)
            && entry
                .stamps
                .is_current(file.id, entry.creation_stamp.load(Ordering::SeqCst))
    }

    pub(crate) fn any_size_limit_exempt(&self, file: &FileMeta) -> bool {
        self.entries
            .values()
            .any(|entry| entry.index.size_limit_exempt(file))
    }
}
