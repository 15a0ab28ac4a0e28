use std::collections::HashSet;
use std::sync::Arc;

use strata_core::{FileId, ProjectId};
use strata_vfs::{FileContent, FileMeta};

use crate::collector::ChangedFilesCollector;
use crate::registry::IndexRegistry;

/// Scans project files and collects those that some content-requiring index
/// considers stale; content-less indices are brought current on the spot.
///
/// Each file is visited at most once per scan.
pub(crate) struct UnindexedFilesFinder<'a> {
    registry: &'a IndexRegistry,
    collector: &'a ChangedFilesCollector,
    project: Option<ProjectId>,
    processed: HashSet<FileId>,
    files: Vec<FileId>,
}

impl<'a> UnindexedFilesFinder<'a> {
    pub fn new(
        registry: &'a IndexRegistry,
        collector: &'a ChangedFilesCollector,
        project: Option<ProjectId>,
    ) -> Self {
        Self {
            registry,
            collector,
            project,
            processed: HashSet::new(),
            files: Vec::new(),
        }
    }

    pub fn process_file(&mut self, meta: &FileMeta) {
        if meta.is_directory || !meta.valid {
            return;
        }
        if !self.processed.insert(meta.id) {
            return;
        }
        if !self.collector.in_set_for_project(meta, self.project) {
            return;
        }

        if !self.collector.is_too_large(meta) {
            for name in self.registry.content_requiring_names() {
                if self.registry.should_index_file(name, meta) {
                    self.files.push(meta.id);
                    break;
                }
            }
        }

        let mut content: Option<FileContent> = None;
        for name in self.registry.content_less_names() {
            if !self.registry.should_index_file(name, meta) {
                continue;
            }
            let content = content
                .get_or_insert_with(|| FileContent::without_bytes(meta.id, meta.path.clone()));
            if let Err(err) = self.registry.update_single_index(name, meta.id, Some(content)) {
                tracing::info!(
                    target = "strata.engine",
                    index = %name,
                    error = %err,
                    "content-less index update failed during scan"
                );
                self.registry.request_rebuild(name);
            }
        }
    }

    pub fn into_files(self) -> Vec<FileId> {
        self.files
    }
}

pub(crate) fn collect_unindexed_files(
    registry: &IndexRegistry,
    collector: &ChangedFilesCollector,
    tree: &Arc<dyn strata_vfs::FileTree>,
    project: Option<ProjectId>,
) -> Vec<FileId> {
    let mut finder = UnindexedFilesFinder::new(registry, collector, project);
    tree.iter_files(&mut |file| {
        if let Some(meta) = tree.meta(file) {
            finder.process_file(&meta);
        }
        true
    });
    finder.into_files()
}
