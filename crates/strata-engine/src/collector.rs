use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use strata_core::{Cancelled, FileId, ProjectId};
use strata_vfs::{FileContent, FileMeta, FileProperty, FileTree, VfsEvent, VfsListener};

use crate::config::IndexingConfig;
use crate::host::IndexHost;
use crate::registry::IndexRegistry;
use crate::scope::{IndexableFileSet, SearchScope};
use crate::stamp::NEEDS_REINDEX_STAMP;

const FORCE_UPDATE_WAIT_SLICE: Duration = Duration::from_millis(500);

/// Deferred removal of one file's data from the indices it still occupies.
pub(crate) struct InvalidationTask {
    file: FileId,
    indices: Vec<String>,
}

struct IndexableSetEntry {
    set: Arc<dyn IndexableFileSet>,
    project: Option<ProjectId>,
}

/// Turns VFS events into eager content-less updates, deferred per-file
/// reindexing (`files_to_update`) and deferred data removal
/// (`future_invalidations`).
pub(crate) struct ChangedFilesCollector {
    tree: Arc<dyn FileTree>,
    registry: Arc<IndexRegistry>,
    host: Arc<dyn IndexHost>,
    config: IndexingConfig,
    files_to_update: Mutex<HashSet<FileId>>,
    future_invalidations: Mutex<VecDeque<InvalidationTask>>,
    gate: BatchGate,
    indexable_sets: Mutex<Vec<IndexableSetEntry>>,
}

impl ChangedFilesCollector {
    pub fn new(
        tree: Arc<dyn FileTree>,
        registry: Arc<IndexRegistry>,
        host: Arc<dyn IndexHost>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            tree,
            registry,
            host,
            config,
            files_to_update: Mutex::new(HashSet::new()),
            future_invalidations: Mutex::new(VecDeque::new()),
            gate: BatchGate::new(),
            indexable_sets: Mutex::new(Vec::new()),
        }
    }

    pub fn register_indexable_set(
        &self,
        set: Arc<dyn IndexableFileSet>,
        project: Option<ProjectId>,
    ) {
        self.indexable_sets
            .lock()
            .push(IndexableSetEntry { set, project });
    }

    pub fn remove_indexable_set(&self, set: &Arc<dyn IndexableFileSet>) {
        self.indexable_sets
            .lock()
            .retain(|entry| !Arc::ptr_eq(&entry.set, set));
    }

    fn in_any_set(&self, meta: &FileMeta) -> bool {
        self.indexable_sets
            .lock()
            .iter()
            .any(|entry| entry.set.contains(meta))
    }

    pub fn in_set_for_project(&self, meta: &FileMeta, project: Option<ProjectId>) -> bool {
        self.indexable_sets.lock().iter().any(|entry| {
            match (entry.project, project) {
                (Some(p), Some(q)) if p != q => return false,
                (Some(_), None) => return false,
                _ => {}
            }
            entry.set.contains(meta)
        })
    }

    fn is_excluded(&self, meta: &FileMeta) -> bool {
        self.config
            .excluded_roots
            .iter()
            .any(|root| meta.path.starts_with(root))
    }

    pub fn is_too_large(&self, meta: &FileMeta) -> bool {
        meta.len > self.config.max_file_size && !self.registry.any_size_limit_exempt(meta)
    }

    /// The event file (or every indexable file under it) gets its content-less
    /// indices updated eagerly and is scheduled for deferred content
    /// reindexing.
    fn mark_dirty(&self, file: FileId) {
        let Some(meta) = self.tree.meta(file) else {
            return;
        };
        self.iterate_indexable_files(&meta, &mut |file_meta| {
            self.mark_file_dirty(file_meta);
            true
        });
    }

    fn mark_file_dirty(&self, meta: &FileMeta) {
        let mut content: Option<FileContent> = None;
        for name in self.registry.content_less_names() {
            let Some(entry) = self.registry.entry(name) else {
                continue;
            };
            if !entry.index.accept_input(meta) {
                continue;
            }
            let content = content
                .get_or_insert_with(|| FileContent::without_bytes(meta.id, meta.path.clone()));
            if let Err(err) = self.registry.update_single_index(name, meta.id, Some(content)) {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "content-less index update failed"
                );
                self.registry.request_rebuild(name);
            }
        }

        if !self.is_too_large(meta) {
            for name in self.registry.content_requiring_names() {
                let Some(entry) = self.registry.entry(name) else {
                    continue;
                };
                if entry.index.accept_input(meta) {
                    self.schedule_for_update(meta.id);
                    break;
                }
            }
        }
    }

    fn iterate_indexable_files(&self, meta: &FileMeta, f: &mut dyn FnMut(&FileMeta) -> bool) {
        if meta.is_directory {
            for child in self.tree.children(meta.id) {
                if let Some(child_meta) = self.tree.meta(child) {
                    self.iterate_indexable_files(&child_meta, f);
                }
            }
        } else if self.in_any_set(meta) {
            f(meta);
        }
    }

    pub fn schedule_for_update(&self, file: FileId) {
        self.files_to_update.lock().insert(file);
    }

    pub fn all_files_to_update(&self) -> Vec<FileId> {
        self.files_to_update.lock().iter().copied().collect()
    }

    pub fn number_of_pending_invalidations(&self) -> usize {
        self.future_invalidations.lock().len()
    }

    /// Detaches `file` from every index whose data for it is current.
    ///
    /// With `mark_for_reindex`, content-requiring indices are stamped with the
    /// reindex sentinel and the file is scheduled for deferred reindexing;
    /// otherwise their data removal is queued as an invalidation task.
    /// Content-less indices are always updated in place with null content.
    pub fn invalidate_indices(&self, file: FileId, mark_for_reindex: bool) {
        let Some(meta) = self.tree.meta(file) else {
            return;
        };
        if self.is_excluded(&meta) {
            return;
        }
        if meta.is_directory {
            if self.tree.were_children_observed(file) {
                for child in self.tree.children(file) {
                    self.invalidate_indices(child, mark_for_reindex);
                }
            }
            return;
        }

        let mut affected: Vec<String> = Vec::new();
        for name in self.registry.index_names() {
            let Some(entry) = self.registry.entry(&name) else {
                continue;
            };
            if !entry.index.depends_on_file_content() {
                if self.registry.should_update_index(&name, &meta) {
                    if let Err(err) = self.registry.update_single_index(&name, file, None) {
                        tracing::info!(
                            target = "strata.engine",
                            index = %name,
                            error = %err,
                            "content-less index invalidation failed"
                        );
                        self.registry.request_rebuild(&name);
                    }
                }
            } else if self.registry.should_update_index(&name, &meta) {
                affected.push(name);
            }
        }

        if !affected.is_empty() {
            if mark_for_reindex && !self.is_too_large(&meta) {
                // Only mark the file as stale; reindexing happens lazily.
                for name in &affected {
                    if let Some(entry) = self.registry.entry(name) {
                        if let Err(err) = entry.stamps.set(file, NEEDS_REINDEX_STAMP) {
                            tracing::info!(
                                target = "strata.engine",
                                index = %name,
                                error = %err,
                                "failed to stamp file for reindex"
                            );
                        }
                    }
                }
                self.schedule_for_update(file);
            } else {
                self.future_invalidations.lock().push_back(InvalidationTask {
                    file,
                    indices: affected.clone(),
                });
            }
        }

        if !mark_for_reindex {
            let removed = self.files_to_update.lock().remove(&file);
            if removed && affected.is_empty() {
                // The file was scheduled for update and stamped stale, so its
                // data may still sit in any content-requiring index. Queue a
                // removal from all of them.
                self.future_invalidations.lock().push_back(InvalidationTask {
                    file,
                    indices: self.registry.content_requiring_names().to_vec(),
                });
            }
        }
    }

    /// Drains the invalidation queue serially. Safe to call from several
    /// threads at once; each task is taken and run by exactly one of them.
    pub fn ensure_all_invalidate_tasks_completed(&self) {
        loop {
            let task = self.future_invalidations.lock().pop_front();
            let Some(task) = task else {
                return;
            };
            self.run_invalidation(&task);
        }
    }

    fn run_invalidation(&self, task: &InvalidationTask) {
        for name in &task.indices {
            if let Err(err) = self.registry.update_single_index(name, task.file, None) {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "deferred invalidation failed"
                );
                self.registry.request_rebuild(name);
            }
        }
    }

    /// Processes every scheduled file matching the requested scope.
    ///
    /// Concurrent callers all leave only once the whole batch is drained, so
    /// each observes a fully up-to-date state no matter which thread did the
    /// reindexing work.
    pub fn force_update(
        &self,
        project: Option<ProjectId>,
        filter: Option<&SearchScope>,
        restricted: Option<FileId>,
        remove_only: bool,
    ) -> Result<(), Cancelled> {
        self.ensure_all_invalidate_tasks_completed();
        for file in self.all_files_to_update() {
            let accepted = match filter {
                None => true,
                Some(scope) => {
                    restricted == Some(file)
                        || self
                            .tree
                            .meta(file)
                            .map(|meta| scope.accepts(&meta))
                            .unwrap_or(false)
                }
            };
            if accepted {
                let _guard = self.gate.enter();
                self.process_file(project, file, remove_only)?;
            }
        }

        self.gate.wait_drained(FORCE_UPDATE_WAIT_SLICE);
        Ok(())
    }

    /// Removes `file` from the pending set and reindexes it (or, for
    /// `remove_only`, purges its data). A no-op when the file was not pending.
    pub fn process_file(
        &self,
        project: Option<ProjectId>,
        file: FileId,
        remove_only: bool,
    ) -> Result<(), Cancelled> {
        let _ = project;
        let really_removed = self.files_to_update.lock().remove(&file);
        if !really_removed {
            return Ok(());
        }
        let Some(meta) = self.tree.meta(file) else {
            return Ok(());
        };
        if !meta.valid {
            return Ok(());
        }

        if remove_only {
            let affected: Vec<String> = self
                .registry
                .index_names()
                .into_iter()
                .filter(|name| {
                    self.registry
                        .entry(name)
                        .map(|entry| entry.index.accept_input(&meta))
                        .unwrap_or(false)
                })
                .collect();
            self.run_invalidation(&InvalidationTask {
                file,
                indices: affected,
            });
            return Ok(());
        }

        self.index_file_content(&meta)
    }

    /// Pushes the file's current content through every index that considers
    /// it stale. Cancellation reschedules the file and propagates.
    pub fn index_file_content(&self, meta: &FileMeta) -> Result<(), Cancelled> {
        let mut content: Option<FileContent> = None;
        for name in self.registry.index_names() {
            if !self.registry.should_index_file(&name, meta) {
                continue;
            }
            if content.is_none() {
                let bytes = self.tree.read(meta.id).unwrap_or_default();
                content = Some(FileContent::new(meta.id, meta.path.clone(), bytes));
            }
            if self.host.check_canceled().is_err() {
                self.schedule_for_update(meta.id);
                return Err(Cancelled);
            }
            if let Err(err) = self
                .registry
                .update_single_index(&name, meta.id, content.as_ref())
            {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "index update failed"
                );
                self.registry.request_rebuild(&name);
            }
        }
        Ok(())
    }

    /// Pending files filtered through the indexable sets of `project`.
    pub fn files_to_update_for(&self, project: Option<ProjectId>) -> Vec<FileId> {
        self.all_files_to_update()
            .into_iter()
            .filter(|file| {
                self.tree
                    .meta(*file)
                    .map(|meta| self.in_set_for_project(&meta, project))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl VfsListener for ChangedFilesCollector {
    fn on_event(&self, event: &VfsEvent) {
        match *event {
            VfsEvent::BeforeContentsChange { file } => self.invalidate_indices(file, true),
            VfsEvent::ContentsChanged { file }
            | VfsEvent::Created { file }
            | VfsEvent::Copied { file } => self.mark_dirty(file),
            VfsEvent::BeforeDelete { file } => self.invalidate_indices(file, false),
            VfsEvent::BeforePropertyChange {
                file,
                property: FileProperty::Name,
            } => {
                // A rename can change the effective file type, making the file
                // non-indexable; treat it as an invalidation.
                let is_directory = self
                    .tree
                    .meta(file)
                    .map(|meta| meta.is_directory)
                    .unwrap_or(false);
                if !is_directory {
                    self.invalidate_indices(file, false);
                }
            }
            VfsEvent::PropertyChanged {
                file,
                property: FileProperty::Name,
            } => {
                let is_directory = self
                    .tree
                    .meta(file)
                    .map(|meta| meta.is_directory)
                    .unwrap_or(false);
                if !is_directory {
                    self.mark_dirty(file);
                }
            }
        }
    }
}

/// Counts threads currently processing a batch; `wait_drained` blocks (in
/// bounded slices) until the count returns to zero so every concurrent
/// entrant leaves only after the batch is done.
pub(crate) struct BatchGate {
    count: Mutex<usize>,
    drained: Condvar,
}

pub(crate) struct GateGuard<'a> {
    gate: &'a BatchGate,
}

impl BatchGate {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    pub fn enter(&self) -> GateGuard<'_> {
        *self.count.lock() += 1;
        GateGuard { gate: self }
    }

    pub fn wait_drained(&self, slice: Duration) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait_for(&mut count, slice);
        }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.gate.count.lock();
        *count -= 1;
        if *count == 0 {
            self.gate.drained.notify_all();
        }
    }
}
