use strata_core::FileId;

/// File properties whose changes are observable through the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileProperty {
    /// The file name. Renames can change the effective file type, so indices
    /// treat them like content invalidation.
    Name,
}

/// A change event emitted by the virtual-file layer.
///
/// `Before*` variants are delivered while the previous state of the file is
/// still observable; the matching "after" event follows once the mutation is
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsEvent {
    BeforeContentsChange { file: FileId },
    ContentsChanged { file: FileId },
    Created { file: FileId },
    Copied { file: FileId },
    BeforeDelete { file: FileId },
    BeforePropertyChange { file: FileId, property: FileProperty },
    PropertyChanged { file: FileId, property: FileProperty },
}

impl VfsEvent {
    pub fn file(&self) -> FileId {
        match *self {
            VfsEvent::BeforeContentsChange { file }
            | VfsEvent::ContentsChanged { file }
            | VfsEvent::Created { file }
            | VfsEvent::Copied { file }
            | VfsEvent::BeforeDelete { file }
            | VfsEvent::BeforePropertyChange { file, .. }
            | VfsEvent::PropertyChanged { file, .. } => file,
        }
    }
}

/// Synchronous observer of [`VfsEvent`]s.
pub trait VfsListener: Send + Sync {
    fn on_event(&self, event: &VfsEvent);
}
