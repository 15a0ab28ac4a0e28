use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use strata_core::{DocumentId, FileId};

use crate::event::{FileProperty, VfsEvent, VfsListener};
use crate::tree::{DocumentStore, FileMeta, FileTree, UnsavedDocument};

/// Deterministic in-memory virtual file system.
///
/// Embedders and tests mutate it through explicit operations; every mutation
/// delivers the corresponding [`VfsEvent`]s synchronously on the calling
/// thread, `before_*` events while the old state is still readable.
///
/// Listeners are held weakly so the file system never keeps its observers
/// alive.
#[derive(Default)]
pub struct MemoryVfs {
    state: Mutex<VfsState>,
    listeners: Mutex<Vec<Weak<dyn VfsListener>>>,
}

#[derive(Default)]
struct VfsState {
    nodes: HashMap<FileId, Node>,
    by_path: HashMap<PathBuf, FileId>,
    next_file: u32,
    next_document: u32,
    document_stamp: u64,
    documents: HashMap<DocumentId, DocumentState>,
    document_by_file: HashMap<FileId, DocumentId>,
}

struct Node {
    path: PathBuf,
    parent: Option<FileId>,
    kind: NodeKind,
    valid: bool,
}

enum NodeKind {
    File { content: Arc<Vec<u8>> },
    Dir { children: Vec<FileId>, observed: bool },
}

struct DocumentState {
    file: FileId,
    text: Arc<String>,
    stamp: u64,
    dirty: bool,
}

impl MemoryVfs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_listener(&self, listener: &Arc<dyn VfsListener>) {
        self.listeners.lock().push(Arc::downgrade(listener));
    }

    fn emit(&self, event: VfsEvent) {
        let listeners: Vec<Arc<dyn VfsListener>> = {
            let mut guard = self.listeners.lock();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    /// Creates a file (and any missing parent directories) and fires `Created`.
    pub fn create_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> FileId {
        let id = {
            let mut state = self.state.lock();
            state.insert_file(path.as_ref(), Arc::new(content.into()))
        };
        self.emit(VfsEvent::Created { file: id });
        id
    }

    /// Creates a directory (and missing parents) and fires `Created`.
    pub fn create_dir(&self, path: impl AsRef<Path>) -> FileId {
        let id = self.state.lock().ensure_dir(path.as_ref());
        self.emit(VfsEvent::Created { file: id });
        id
    }

    /// Replaces the content of `file`, firing the before/after event pair.
    pub fn write_file(&self, file: FileId, content: impl Into<Vec<u8>>) {
        self.emit(VfsEvent::BeforeContentsChange { file });
        {
            let mut state = self.state.lock();
            if let Some(node) = state.nodes.get_mut(&file) {
                if let NodeKind::File { content: slot } = &mut node.kind {
                    *slot = Arc::new(content.into());
                }
            }
        }
        self.emit(VfsEvent::ContentsChanged { file });
    }

    /// Deletes `file` (recursively for directories), firing `BeforeDelete`
    /// for every affected node while it is still readable.
    pub fn delete(&self, file: FileId) {
        if !self.state.lock().nodes.contains_key(&file) {
            tracing::debug!(target = "strata.vfs", ?file, "delete of unknown file ignored");
            return;
        }
        let children: Vec<FileId> = {
            let state = self.state.lock();
            match state.nodes.get(&file) {
                Some(Node {
                    kind: NodeKind::Dir { children, .. },
                    ..
                }) => children.clone(),
                _ => Vec::new(),
            }
        };
        for child in children {
            self.delete(child);
        }

        self.emit(VfsEvent::BeforeDelete { file });
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(&file) {
            node.valid = false;
            let path = node.path.clone();
            let parent = node.parent;
            state.by_path.remove(&path);
            if let Some(parent) = parent {
                if let Some(Node {
                    kind: NodeKind::Dir { children, .. },
                    ..
                }) = state.nodes.get_mut(&parent)
                {
                    children.retain(|c| *c != file);
                }
            }
            if let Some(doc) = state.document_by_file.remove(&file) {
                state.documents.remove(&doc);
            }
        }
    }

    /// Renames `file` within its directory, firing the property event pair.
    pub fn rename(&self, file: FileId, new_name: &str) {
        self.emit(VfsEvent::BeforePropertyChange {
            file,
            property: FileProperty::Name,
        });
        {
            let mut state = self.state.lock();
            state.rename_node(file, new_name);
        }
        self.emit(VfsEvent::PropertyChanged {
            file,
            property: FileProperty::Name,
        });
    }

    /// Copies `src` to `dest_path` and fires `Copied` for the new file.
    pub fn copy_file(&self, src: FileId, dest_path: impl AsRef<Path>) -> io::Result<FileId> {
        let id = {
            let mut state = self.state.lock();
            let content = match state.nodes.get(&src) {
                Some(Node {
                    kind: NodeKind::File { content },
                    valid: true,
                    ..
                }) => content.clone(),
                _ => return Err(io::Error::new(io::ErrorKind::NotFound, "source not found")),
            };
            state.insert_file(dest_path.as_ref(), content)
        };
        self.emit(VfsEvent::Copied { file: id });
        Ok(id)
    }

    pub fn file_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
        self.state.lock().by_path.get(path.as_ref()).copied()
    }

    /// Opens an editor buffer over `file`.
    pub fn open_document(&self, file: FileId, text: impl Into<String>) -> DocumentId {
        let mut state = self.state.lock();
        let text: Arc<String> = Arc::new(text.into());
        let dirty = match state.nodes.get(&file) {
            Some(Node {
                kind: NodeKind::File { content },
                ..
            }) => content.as_slice() != text.as_bytes(),
            _ => true,
        };
        let doc = DocumentId::from_raw(state.next_document);
        state.next_document += 1;
        state.document_stamp += 1;
        let stamp = state.document_stamp;
        state.documents.insert(
            doc,
            DocumentState {
                file,
                text,
                stamp,
                dirty,
            },
        );
        state.document_by_file.insert(file, doc);
        doc
    }

    pub fn edit_document(&self, doc: DocumentId, text: impl Into<String>) {
        let mut state = self.state.lock();
        state.document_stamp += 1;
        let stamp = state.document_stamp;
        let file_content = |state: &VfsState, file: FileId| match state.nodes.get(&file) {
            Some(Node {
                kind: NodeKind::File { content },
                ..
            }) => Some(content.clone()),
            _ => None,
        };
        if let Some(entry) = state.documents.get(&doc) {
            let disk = file_content(&*state, entry.file);
            let text: Arc<String> = Arc::new(text.into());
            let dirty = disk.map_or(true, |d| d.as_slice() != text.as_bytes());
            let entry = state.documents.get_mut(&doc).expect("entry just observed");
            entry.text = text;
            entry.stamp = stamp;
            entry.dirty = dirty;
        }
    }

    /// Writes the buffer back to the file, firing the content event pair.
    pub fn save_document(&self, doc: DocumentId) {
        let (file, text) = {
            let state = self.state.lock();
            match state.documents.get(&doc) {
                Some(entry) => (entry.file, entry.text.clone()),
                None => return,
            }
        };
        self.write_file(file, text.as_bytes().to_vec());
        if let Some(entry) = self.state.lock().documents.get_mut(&doc) {
            entry.dirty = false;
        }
    }

    pub fn close_document(&self, doc: DocumentId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.documents.remove(&doc) {
            state.document_by_file.remove(&entry.file);
        }
    }

    pub fn document_for_file(&self, file: FileId) -> Option<DocumentId> {
        self.state.lock().document_by_file.get(&file).copied()
    }
}

impl VfsState {
    fn alloc_file_id(&mut self) -> FileId {
        let id = FileId::from_raw(self.next_file);
        self.next_file += 1;
        id
    }

    fn ensure_dir(&mut self, path: &Path) -> FileId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        let parent_id = parent.map(|p| self.ensure_dir(p));
        let id = self.alloc_file_id();
        self.nodes.insert(
            id,
            Node {
                path: path.to_path_buf(),
                parent: parent_id,
                kind: NodeKind::Dir {
                    children: Vec::new(),
                    observed: false,
                },
                valid: true,
            },
        );
        self.by_path.insert(path.to_path_buf(), id);
        if let Some(parent_id) = parent_id {
            self.attach_child(parent_id, id);
        }
        id
    }

    fn insert_file(&mut self, path: &Path, content: Arc<Vec<u8>>) -> FileId {
        if let Some(&existing) = self.by_path.get(path) {
            if let Some(node) = self.nodes.get_mut(&existing) {
                if let NodeKind::File { content: slot } = &mut node.kind {
                    *slot = content;
                    return existing;
                }
            }
        }
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| self.ensure_dir(p));
        let id = self.alloc_file_id();
        self.nodes.insert(
            id,
            Node {
                path: path.to_path_buf(),
                parent,
                kind: NodeKind::File { content },
                valid: true,
            },
        );
        self.by_path.insert(path.to_path_buf(), id);
        if let Some(parent) = parent {
            self.attach_child(parent, id);
        }
        id
    }

    fn attach_child(&mut self, parent: FileId, child: FileId) {
        if let Some(Node {
            kind: NodeKind::Dir { children, .. },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }

    fn rename_node(&mut self, file: FileId, new_name: &str) {
        let Some(node) = self.nodes.get(&file) else {
            return;
        };
        let old_path = node.path.clone();
        let new_path = old_path
            .parent()
            .map(|p| p.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        self.by_path.remove(&old_path);
        self.by_path.insert(new_path.clone(), file);
        if let Some(node) = self.nodes.get_mut(&file) {
            node.path = new_path.clone();
        }
        self.fix_descendant_paths(file, &new_path);
    }

    fn fix_descendant_paths(&mut self, dir: FileId, dir_path: &Path) {
        let children = match self.nodes.get(&dir) {
            Some(Node {
                kind: NodeKind::Dir { children, .. },
                ..
            }) => children.clone(),
            _ => return,
        };
        for child in children {
            let Some(node) = self.nodes.get(&child) else {
                continue;
            };
            let Some(name) = node.path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let old_path = node.path.clone();
            let new_path = dir_path.join(name);
            self.by_path.remove(&old_path);
            self.by_path.insert(new_path.clone(), child);
            if let Some(node) = self.nodes.get_mut(&child) {
                node.path = new_path.clone();
            }
            self.fix_descendant_paths(child, &new_path);
        }
    }
}

impl FileTree for MemoryVfs {
    fn meta(&self, file: FileId) -> Option<FileMeta> {
        let state = self.state.lock();
        let node = state.nodes.get(&file)?;
        Some(FileMeta {
            id: file,
            path: node.path.clone(),
            is_directory: matches!(node.kind, NodeKind::Dir { .. }),
            len: match &node.kind {
                NodeKind::File { content } => content.len() as u64,
                NodeKind::Dir { .. } => 0,
            },
            valid: node.valid,
        })
    }

    fn read(&self, file: FileId) -> io::Result<Arc<Vec<u8>>> {
        let state = self.state.lock();
        match state.nodes.get(&file) {
            Some(Node {
                kind: NodeKind::File { content },
                valid: true,
                ..
            }) => Ok(content.clone()),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn children(&self, dir: FileId) -> Vec<FileId> {
        let mut state = self.state.lock();
        match state.nodes.get_mut(&dir) {
            Some(Node {
                kind: NodeKind::Dir { children, observed },
                ..
            }) => {
                *observed = true;
                children.clone()
            }
            _ => Vec::new(),
        }
    }

    fn were_children_observed(&self, dir: FileId) -> bool {
        let state = self.state.lock();
        matches!(
            state.nodes.get(&dir),
            Some(Node {
                kind: NodeKind::Dir { observed: true, .. },
                ..
            })
        )
    }

    fn iter_files(&self, f: &mut dyn FnMut(FileId) -> bool) {
        let files: Vec<FileId> = {
            let state = self.state.lock();
            state
                .nodes
                .iter()
                .filter(|(_, node)| node.valid && matches!(node.kind, NodeKind::File { .. }))
                .map(|(id, _)| *id)
                .collect()
        };
        for file in files {
            if !f(file) {
                return;
            }
        }
    }
}

impl DocumentStore for MemoryVfs {
    fn unsaved_documents(&self) -> Vec<UnsavedDocument> {
        let state = self.state.lock();
        state
            .documents
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(doc, entry)| UnsavedDocument {
                document: *doc,
                file: entry.file,
                stamp: entry.stamp,
                text: entry.text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct RecordingListener {
        events: PlMutex<Vec<VfsEvent>>,
    }

    impl VfsListener for RecordingListener {
        fn on_event(&self, event: &VfsEvent) {
            self.events.lock().push(*event);
        }
    }

    #[test]
    fn content_change_fires_before_and_after() {
        let vfs = MemoryVfs::new();
        let recorder = Arc::new(RecordingListener::default());
        let listener: Arc<dyn VfsListener> = recorder.clone();
        vfs.add_listener(&listener);

        let file = vfs.create_file("/src/Main.java", "one");
        vfs.write_file(file, "two");

        let events = recorder.events.lock();
        assert_eq!(
            *events,
            vec![
                VfsEvent::Created { file },
                VfsEvent::BeforeContentsChange { file },
                VfsEvent::ContentsChanged { file },
            ]
        );
    }

    #[test]
    fn before_delete_still_sees_the_file() {
        let vfs = MemoryVfs::new();

        struct Checker {
            vfs: Arc<MemoryVfs>,
            saw_valid: PlMutex<bool>,
        }
        impl VfsListener for Checker {
            fn on_event(&self, event: &VfsEvent) {
                if let VfsEvent::BeforeDelete { file } = event {
                    let meta = self.vfs.meta(*file).unwrap();
                    *self.saw_valid.lock() = meta.valid;
                }
            }
        }

        let checker = Arc::new(Checker {
            vfs: vfs.clone(),
            saw_valid: PlMutex::new(false),
        });
        let listener: Arc<dyn VfsListener> = checker.clone();
        vfs.add_listener(&listener);

        let file = vfs.create_file("/a.txt", "x");
        vfs.delete(file);

        assert!(*checker.saw_valid.lock());
        assert!(!vfs.meta(file).unwrap().valid);
    }

    #[test]
    fn children_observation_is_recorded() {
        let vfs = MemoryVfs::new();
        vfs.create_file("/dir/a.txt", "a");
        let dir = vfs.file_id("/dir").unwrap();

        assert!(!vfs.were_children_observed(dir));
        let children = vfs.children(dir);
        assert_eq!(children.len(), 1);
        assert!(vfs.were_children_observed(dir));
    }

    #[test]
    fn rename_updates_descendant_paths() {
        let vfs = MemoryVfs::new();
        let file = vfs.create_file("/dir/sub/a.txt", "a");
        let dir = vfs.file_id("/dir").unwrap();

        vfs.rename(dir, "renamed");
        assert_eq!(vfs.meta(file).unwrap().path, PathBuf::from("/renamed/sub/a.txt"));
        assert_eq!(vfs.file_id("/renamed/sub/a.txt"), Some(file));
        assert_eq!(vfs.file_id("/dir/sub/a.txt"), None);
    }

    #[test]
    fn unsaved_documents_track_dirtiness() {
        let vfs = MemoryVfs::new();
        let file = vfs.create_file("/a.txt", "disk");

        let doc = vfs.open_document(file, "disk");
        assert!(vfs.unsaved_documents().is_empty());

        vfs.edit_document(doc, "edited");
        let unsaved = vfs.unsaved_documents();
        assert_eq!(unsaved.len(), 1);
        assert_eq!(unsaved[0].file, file);
        assert_eq!(unsaved[0].text.as_str(), "edited");

        vfs.save_document(doc);
        assert!(vfs.unsaved_documents().is_empty());
        assert_eq!(vfs.read(file).unwrap().as_slice(), b"edited");
    }

    #[test]
    fn file_ids_are_not_reused_after_delete() {
        let vfs = MemoryVfs::new();
        let a = vfs.create_file("/a.txt", "a");
        vfs.delete(a);
        let b = vfs.create_file("/b.txt", "b");
        assert_ne!(a, b);
        assert!(!vfs.meta(a).unwrap().valid);
    }
}
