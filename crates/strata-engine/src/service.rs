use std::any::Any;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use strata_core::{DocumentId, FileId, ProjectId};
use strata_storage::{PersistentMap, RegisterOutcome, StorageError, VersionedStore};
use strata_vfs::{DocumentStore, FileTree, VfsListener};

use crate::collector::ChangedFilesCollector;
use crate::config::IndexingConfig;
use crate::error::{IndexError, RegisterError};
use crate::extension::{IndexExtension, IndexKey};
use crate::flush::FlushDaemon;
use crate::host::{DumbModePolicy, IndexHost};
use crate::input_keys::InputIdToKeys;
use crate::memory_overlay::MemoryOverlay;
use crate::registry::{AnyIndex, IndexEntry, IndexRegistry, RebuildStatus, StatusCell};
use crate::scan;
use crate::scope::{IndexableFileSet, SearchScope};
use crate::unsaved::{UnsavedDocumentsOverlay, UnsavedMarksInvalidator};
use crate::updatable_index::UpdatableIndex;
use crate::value_container::ContainerExternalizer;

thread_local! {
    static REENTRANCY_GUARD: Cell<bool> = const { Cell::new(false) };
    static UP_TO_DATE_CHECK_DISABLED: Cell<u32> = const { Cell::new(0) };
}

/// Suppresses the up-to-date pass of queries issued by the current thread.
///
/// Paired with [`enable_up_to_date_check_for_current_thread`]; nesting is
/// counted. Extensions whose indexers themselves query other indices use this
/// to avoid recursive re-indexing.
pub fn disable_up_to_date_check_for_current_thread() {
    UP_TO_DATE_CHECK_DISABLED.with(|c| c.set(c.get() + 1));
}

pub fn enable_up_to_date_check_for_current_thread() {
    UP_TO_DATE_CHECK_DISABLED.with(|c| c.set(c.get().saturating_sub(1)));
}

fn up_to_date_check_enabled() -> bool {
    UP_TO_DATE_CHECK_DISABLED.with(|c| c.get() == 0)
}

struct ReentrancyGuard;

impl ReentrancyGuard {
    /// Returns `None` when the current thread is already inside
    /// `ensure_up_to_date`.
    fn enter() -> Option<Self> {
        REENTRANCY_GUARD.with(|g| {
            if g.get() {
                None
            } else {
                g.set(true);
                Some(ReentrancyGuard)
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        REENTRANCY_GUARD.with(|g| g.set(false));
    }
}

/// The index engine facade: owns the registry, the change collector, the
/// unsaved-document overlay and the flush daemon, and exposes the query API
/// with up-to-date-on-read semantics.
pub struct IndexService {
    registry: Arc<IndexRegistry>,
    collector: Arc<ChangedFilesCollector>,
    unsaved: Arc<UnsavedDocumentsOverlay>,
    tree: Arc<dyn FileTree>,
    host: Arc<dyn IndexHost>,
    flush_daemon: Mutex<Option<FlushDaemon>>,
    shutdown_done: AtomicBool,
}

type Registration =
    Box<dyn FnOnce(&mut RegistrationCx<'_>) -> Result<(), RegisterError> + Send>;

pub struct IndexServiceBuilder {
    root: PathBuf,
    tree: Arc<dyn FileTree>,
    documents: Arc<dyn DocumentStore>,
    host: Arc<dyn IndexHost>,
    config: IndexingConfig,
    extensions: Vec<Registration>,
}

struct RegistrationCx<'a> {
    store: &'a VersionedStore,
    corrupted: bool,
    version_changed: bool,
    entries: HashMap<String, IndexEntry>,
    unsaved: Arc<UnsavedDocumentsOverlay>,
}

impl IndexServiceBuilder {
    pub fn new(
        root: impl Into<PathBuf>,
        tree: Arc<dyn FileTree>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            root: root.into(),
            tree,
            documents,
            host: Arc::new(crate::host::DefaultHost),
            config: IndexingConfig::default(),
            extensions: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn IndexHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_config(mut self, config: IndexingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_extension<K, V>(mut self, extension: Arc<dyn IndexExtension<K, V>>) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.extensions
            .push(Box::new(move |cx| cx.register(extension)));
        self
    }

    pub fn build(self) -> Result<Arc<IndexService>, RegisterError> {
        let store = VersionedStore::new(&self.root)?;
        let unclean_shutdown = store.session_marker_present();
        if unclean_shutdown {
            tracing::info!(
                target = "strata.engine",
                "previous session did not shut down cleanly; indices will be rebuilt"
            );
        }
        let corrupted = store.corruption_marker_present() || unclean_shutdown;

        let unsaved = Arc::new(UnsavedDocumentsOverlay::new(self.documents.clone()));
        let mut cx = RegistrationCx {
            store: &store,
            corrupted,
            version_changed: false,
            entries: HashMap::new(),
            unsaved: unsaved.clone(),
        };
        for registration in self.extensions {
            registration(&mut cx)?;
        }
        let RegistrationCx {
            entries,
            version_changed,
            ..
        } = cx;

        let names: Vec<String> = entries.keys().cloned().collect();
        let current: HashSet<&str> = names.iter().map(String::as_str).collect();
        store.drop_unregistered(&current);
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        store.save_registered(&name_refs);
        store.delete_corruption_marker();
        if let Err(err) = store.create_session_marker() {
            tracing::warn!(
                target = "strata.engine",
                error = %err,
                "failed to create session marker"
            );
        }

        let registry = Arc::new(IndexRegistry::new(store, entries, self.host.clone()));

        // Rebuilds requested during registration are carried out right away.
        for name in registry.index_names() {
            let Some(entry) = registry.entry(&name) else {
                continue;
            };
            if entry
                .status
                .transition(RebuildStatus::RequiresRebuild, RebuildStatus::Ok)
            {
                if let Err(err) = registry.clear_index(&name) {
                    tracing::warn!(
                        target = "strata.engine",
                        index = %name,
                        error = %err,
                        "startup index clear failed"
                    );
                    registry.request_rebuild(&name);
                }
            }
        }

        if self.config.show_rebuild_notifications {
            if corrupted {
                self.host
                    .notify_rebuild("Index files on disk are corrupted. Indices will be rebuilt.");
            } else if version_changed {
                self.host.notify_rebuild(
                    "Index file format has changed for some indices. These indices will be rebuilt.",
                );
            }
        }

        let collector = Arc::new(ChangedFilesCollector::new(
            self.tree.clone(),
            registry.clone(),
            self.host.clone(),
            self.config.clone(),
        ));
        let flush_daemon = self
            .config
            .flush_daemon
            .then(|| FlushDaemon::start(registry.clone(), self.config.flush_interval));

        Ok(Arc::new(IndexService {
            registry,
            collector,
            unsaved,
            tree: self.tree,
            host: self.host,
            flush_daemon: Mutex::new(flush_daemon),
            shutdown_done: AtomicBool::new(false),
        }))
    }
}

impl RegistrationCx<'_> {
    fn register<K, V>(
        &mut self,
        extension: Arc<dyn IndexExtension<K, V>>,
    ) -> Result<(), RegisterError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let name = extension.name().to_string();
        let version = extension.version();
        let outcome = self.store.register_index(&name, version, self.corrupted)?;
        if !self.corrupted && outcome == RegisterOutcome::Rebuilt {
            self.version_changed = true;
        }
        let dir = self.store.index_dir(&name);

        let mut failures = 0usize;
        let (overlay, reverse, stamps) = loop {
            match open_storages(&dir, &extension) {
                Ok(parts) => break parts,
                Err(err) if failures < 2 => {
                    failures += 1;
                    tracing::info!(
                        target = "strata.engine",
                        index = %name,
                        error = %err,
                        "failed to open index storage; wiping and retrying"
                    );
                    self.store.delete_index_dir(&name)?;
                    self.store.rewrite_version(&name, version)?;
                }
                Err(err) => {
                    return Err(RegisterError::OpenFailed {
                        index: name,
                        source: err,
                    })
                }
            }
        };

        let index = UpdatableIndex::new(extension, overlay, reverse);
        index.add_buffering_listener(Arc::new(UnsavedMarksInvalidator::new(
            name.clone(),
            self.unsaved.clone(),
        )));

        let creation_stamp = self.store.creation_stamp(&name)?;
        let status = StatusCell::new();
        if failures >= 2 {
            // The replacement storage opened on a wiped directory; the data is
            // gone and the index must be rebuilt from scratch.
            status.set(RebuildStatus::RequiresRebuild);
        }

        let typed: Arc<dyn Any + Send + Sync> = index.clone();
        let erased: Arc<dyn AnyIndex> = index;
        self.entries.insert(
            name,
            IndexEntry {
                index: erased,
                typed,
                version,
                creation_stamp: AtomicI64::new(creation_stamp),
                status,
                stamps,
            },
        );
        Ok(())
    }
}

#[allow(clippy::type_complexity)]
fn open_storages<K, V>(
    dir: &Path,
    extension: &Arc<dyn IndexExtension<K, V>>,
) -> Result<(MemoryOverlay<K, V>, InputIdToKeys<K>, crate::stamp::IndexingStamp), StorageError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Clone + Send + Sync + 'static,
{
    let backend = PersistentMap::open(
        dir,
        "storage",
        extension.key_externalizer(),
        Arc::new(ContainerExternalizer::new(extension.value_externalizer())),
        extension.cache_size(),
    )?;
    let reverse = InputIdToKeys::open(dir, extension.key_externalizer())?;
    let stamps = crate::stamp::IndexingStamp::open(dir)?;
    Ok((MemoryOverlay::new(backend), reverse, stamps))
}

impl IndexService {
    /// The listener to register with the virtual-file layer.
    pub fn vfs_listener(&self) -> Arc<dyn VfsListener> {
        self.collector.clone()
    }

    /// Direct handle to one index, mainly for embedders that need raw
    /// container access. Queries should go through the service methods.
    pub fn index<K, V>(&self, key: &IndexKey<K, V>) -> Option<Arc<UpdatableIndex<K, V>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.registry.typed_index(key)
    }

    pub fn rebuild_status(&self, name: &str) -> Option<RebuildStatus> {
        self.registry.rebuild_status(name)
    }

    pub fn number_of_pending_invalidations(&self) -> usize {
        self.collector.number_of_pending_invalidations()
    }

    /// Brings `name` up to date with every change event delivered so far.
    ///
    /// Content-less indices return immediately (they are updated inside the
    /// change listener). Reentrant calls from the same thread are no-ops.
    pub fn ensure_up_to_date(
        &self,
        name: &str,
        project: Option<ProjectId>,
        filter: Option<&SearchScope>,
        restricted: Option<FileId>,
    ) -> Result<(), IndexError> {
        let Some(entry) = self.registry.entry(name) else {
            return Ok(());
        };
        if !entry.index.depends_on_file_content() {
            return Ok(());
        }

        if self.host.is_dumb() {
            self.host.check_canceled()?;
            match self.host.dumb_mode_policy() {
                DumbModePolicy::WaitForSmart => self.host.wait_for_smart_mode(),
                DumbModePolicy::Fail => return Err(IndexError::NotReady),
            }
        }

        let Some(_guard) = ReentrancyGuard::enter() else {
            return Ok(());
        };

        self.collector.ensure_all_invalidate_tasks_completed();
        if up_to_date_check_enabled() {
            let attempt = (|| -> Result<(), IndexError> {
                self.registry.check_rebuild(name, false)?;
                self.collector.force_update(project, filter, restricted, false)?;
                self.unsaved.index_unsaved_documents(
                    &self.registry,
                    self.tree.as_ref(),
                    name,
                    filter,
                    restricted,
                )?;
                Ok(())
            })();
            match attempt {
                Ok(()) => {}
                Err(IndexError::Storage(err)) => {
                    self.registry.schedule_rebuild(name, &err);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn with_index<K, V, R>(
        &self,
        key: &IndexKey<K, V>,
        project: Option<ProjectId>,
        filter: Option<&SearchScope>,
        restricted: Option<FileId>,
        empty: R,
        f: impl FnOnce(&Arc<UpdatableIndex<K, V>>) -> Result<R, IndexError>,
    ) -> Result<R, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let Some(index) = self.registry.typed_index(key) else {
            return Ok(empty);
        };
        self.ensure_up_to_date(key.name(), project, filter, restricted)?;

        match f(&index) {
            Ok(result) => Ok(result),
            Err(IndexError::Storage(err)) => {
                self.registry.schedule_rebuild(key.name(), &err);
                Ok(empty)
            }
            Err(other) => Err(other),
        }
    }

    pub fn get_all_keys<K, V>(
        &self,
        key: &IndexKey<K, V>,
        project: Option<ProjectId>,
    ) -> Result<HashSet<K>, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let mut keys = HashSet::new();
        self.process_all_keys(key, project, |k| {
            keys.insert(k.clone());
            true
        })?;
        Ok(keys)
    }

    pub fn process_all_keys<K, V>(
        &self,
        key: &IndexKey<K, V>,
        project: Option<ProjectId>,
        mut f: impl FnMut(&K) -> bool,
    ) -> Result<bool, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.with_index(key, project, None, None, true, |index| {
            index.process_all_keys(&mut f).map_err(IndexError::from)
        })
    }

    pub fn get_values<K, V>(
        &self,
        key: &IndexKey<K, V>,
        data_key: &K,
        scope: &SearchScope,
    ) -> Result<Vec<V>, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let mut values = Vec::new();
        self.process_values_impl(key, data_key, true, None, scope, |_, value| {
            values.push(value.clone());
            true
        })?;
        Ok(values)
    }

    pub fn get_containing_files<K, V>(
        &self,
        key: &IndexKey<K, V>,
        data_key: &K,
        scope: &SearchScope,
    ) -> Result<HashSet<FileId>, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        let mut files = HashSet::new();
        self.process_values_impl(key, data_key, false, None, scope, |file, _| {
            files.insert(file);
            true
        })?;
        Ok(files)
    }

    /// Visits `(file, value)` pairs under `data_key`; `restricted` limits the
    /// visit to one file. Returns `false` when the visitor stopped early.
    pub fn process_values<K, V>(
        &self,
        key: &IndexKey<K, V>,
        data_key: &K,
        restricted: Option<FileId>,
        scope: &SearchScope,
        f: impl FnMut(FileId, &V) -> bool,
    ) -> Result<bool, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.process_values_impl(key, data_key, false, restricted, scope, f)
    }

    fn process_values_impl<K, V>(
        &self,
        key: &IndexKey<K, V>,
        data_key: &K,
        ensure_value_processed_once: bool,
        restricted: Option<FileId>,
        scope: &SearchScope,
        mut f: impl FnMut(FileId, &V) -> bool,
    ) -> Result<bool, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.with_index(key, None, Some(scope), restricted, true, |index| {
            index.with_read(|reader| -> Result<bool, IndexError> {
                let container = reader.data(data_key)?;
                if let Some(restricted) = restricted {
                    for (value, ids) in container.iter() {
                        if ids.contains(&restricted) && !f(restricted, value) {
                            return Ok(false);
                        }
                    }
                    return Ok(true);
                }
                for (value, ids) in container.iter() {
                    for id in ids {
                        let Some(meta) = self.tree.meta(*id) else {
                            continue;
                        };
                        if !meta.valid || !scope.accepts(&meta) {
                            continue;
                        }
                        if !f(*id, value) {
                            return Ok(false);
                        }
                        if ensure_value_processed_once {
                            break;
                        }
                    }
                }
                Ok(true)
            })
        })
    }

    /// Visits the files associated with every key in `keys`, i.e. the
    /// intersection of the per-key containing-file sets (smallest first).
    pub fn process_files_containing_all_keys<K, V>(
        &self,
        key: &IndexKey<K, V>,
        keys: &[K],
        scope: &SearchScope,
        value_filter: Option<&dyn Fn(&V) -> bool>,
        mut f: impl FnMut(FileId) -> bool,
    ) -> Result<bool, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        if keys.is_empty() {
            return Ok(true);
        }
        let ids = self.with_index(key, None, Some(scope), None, HashSet::new(), |index| {
            index.with_read(|reader| -> Result<HashSet<FileId>, IndexError> {
                let mut sets: Vec<HashSet<FileId>> = Vec::with_capacity(keys.len());
                for data_key in keys {
                    self.host.check_canceled()?;
                    let container = reader.data(data_key)?;
                    let mut ids = HashSet::new();
                    for (value, value_ids) in container.iter() {
                        if let Some(filter) = value_filter {
                            if !filter(value) {
                                continue;
                            }
                        }
                        ids.extend(value_ids.iter().copied());
                    }
                    if ids.is_empty() {
                        return Ok(HashSet::new());
                    }
                    sets.push(ids);
                }
                sets.sort_by_key(|set| set.len());
                let mut sets = sets.into_iter();
                let mut intersection = sets.next().unwrap_or_default();
                for other in sets {
                    intersection.retain(|id| other.contains(id));
                }
                Ok(intersection)
            })
        })?;

        for id in ids {
            self.host.check_canceled()?;
            let Some(meta) = self.tree.meta(id) else {
                continue;
            };
            if !meta.valid || !scope.accepts(&meta) {
                continue;
            }
            if !f(id) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Files associated with all of `keys`, ignoring values.
    pub fn get_files_with_key<K, V>(
        &self,
        key: &IndexKey<K, V>,
        keys: &[K],
        scope: &SearchScope,
        f: impl FnMut(FileId) -> bool,
    ) -> Result<bool, IndexError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Eq + Clone + Send + Sync + 'static,
    {
        self.process_files_containing_all_keys(key, keys, scope, None, f)
    }

    /// Invalidates `file` and schedules it for reindexing.
    pub fn request_reindex(&self, file: FileId) {
        self.collector.invalidate_indices(file, true);
    }

    /// Invalidates `file` without scheduling a reindex (it is no longer
    /// indexable).
    pub fn request_reindex_excluded(&self, file: FileId) {
        self.collector.invalidate_indices(file, false);
    }

    pub fn request_rebuild(&self, name: &str) {
        self.registry.request_rebuild(name);
    }

    /// Pending files relevant to `project` (filtered through its indexable
    /// sets).
    pub fn get_files_to_update(&self, project: Option<ProjectId>) -> Vec<FileId> {
        self.collector.files_to_update_for(project)
    }

    /// Reindexes one refreshed file if it was pending, after draining the
    /// invalidation queue.
    pub fn process_refreshed_file(
        &self,
        project: Option<ProjectId>,
        file: FileId,
    ) -> Result<(), IndexError> {
        self.collector.ensure_all_invalidate_tasks_completed();
        self.collector.process_file(project, file, false)?;
        Ok(())
    }

    /// Unconditionally pushes `file`'s content through every stale index.
    pub fn index_file_content(&self, file: FileId) -> Result<(), IndexError> {
        self.collector.ensure_all_invalidate_tasks_completed();
        let Some(meta) = self.tree.meta(file) else {
            return Ok(());
        };
        self.collector.index_file_content(&meta)?;
        Ok(())
    }

    /// Scans all files and returns those stale for some content-requiring
    /// index; content-less indices are brought current during the scan.
    pub fn collect_unindexed_files(&self, project: Option<ProjectId>) -> Vec<FileId> {
        scan::collect_unindexed_files(&self.registry, &self.collector, &self.tree, project)
    }

    pub fn register_indexable_set(
        &self,
        set: Arc<dyn IndexableFileSet>,
        project: Option<ProjectId>,
    ) {
        self.collector.register_indexable_set(set, project);
    }

    /// Unregisters an indexable set, draining pending invalidations and
    /// purging pending files first so removal cannot race an in-flight
    /// update.
    pub fn remove_indexable_set(&self, set: &Arc<dyn IndexableFileSet>) {
        self.collector.ensure_all_invalidate_tasks_completed();
        if let Err(err) = self.collector.force_update(None, None, None, true) {
            tracing::info!(
                target = "strata.engine",
                error = %err,
                "cancelled while draining before indexable-set removal"
            );
        }
        self.collector.remove_indexable_set(set);
    }

    pub fn transaction_started(&self, document: DocumentId, file: FileId) {
        self.unsaved.transaction_started(document, file);
    }

    pub fn transaction_completed(&self, document: DocumentId) {
        self.unsaved.transaction_completed(document);
    }

    pub fn write_action_started(&self) {
        self.unsaved.invalidate_up_to_date();
    }

    /// A document's content was replaced from disk; buffered index state is
    /// stale.
    pub fn file_content_reloaded(&self, _file: FileId) {
        self.cleanup_memory_storage();
    }

    /// All unsaved documents were discarded; buffered index state is stale.
    pub fn unsaved_documents_dropped(&self) {
        self.cleanup_memory_storage();
    }

    fn cleanup_memory_storage(&self) {
        for (_, entry) in self.registry.entries() {
            entry.index.set_buffering(false);
        }
    }

    /// Flushes every index now (subject to the heavy-process gate).
    pub fn flush(&self) {
        self.registry.flush_all(self.registry.mod_count());
    }

    /// Stops the flush daemon, purges pending files, disposes every index and
    /// removes the session marker. Idempotent; errors are logged and the
    /// first one is returned.
    pub fn shutdown(&self) -> Result<(), IndexError> {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.flush_daemon.lock() = None;
        tracing::info!(target = "strata.engine", "starting index shutdown");

        let result = (|| -> Result<(), IndexError> {
            self.collector.ensure_all_invalidate_tasks_completed();
            self.collector.force_update(None, None, None, true)?;

            let mut first_error: Option<StorageError> = None;
            for name in self.registry.index_names() {
                // A pending rebuild is only cleaned up, not re-scanned.
                let _ = self.registry.check_rebuild(&name, true);
                let Some(entry) = self.registry.entry(&name) else {
                    continue;
                };
                for op in [entry.index.dispose(), entry.stamps.close()] {
                    if let Err(err) = op {
                        tracing::error!(
                            target = "strata.engine",
                            index = %name,
                            error = %err,
                            "failed to dispose index"
                        );
                        first_error.get_or_insert(err);
                    }
                }
            }
            match first_error {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })();

        match &result {
            Ok(()) => {
                self.registry.store().delete_session_marker();
                tracing::info!(target = "strata.engine", "index shutdown complete");
            }
            Err(err) => {
                tracing::error!(
                    target = "strata.engine",
                    error = %err,
                    "problems during index shutdown"
                );
            }
        }
        result
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        if !self.shutdown_done.load(Ordering::SeqCst) {
            let _ = self.shutdown();
        }
    }
}
