//! Virtual-file layer the index engine observes.
//!
//! The engine never walks the operating system's file system directly. It
//! consumes:
//! - [`FileTree`] — id-addressed metadata, content and directory structure,
//! - [`VfsEvent`] — the change events delivered *around* mutations (the
//!   `before_*` events fire while the old state is still observable),
//! - [`DocumentStore`] — in-editor buffers that may differ from disk.
//!
//! [`MemoryVfs`] is a deterministic in-memory implementation of all three,
//! used by tests and embedders that drive the engine programmatically. Event
//! delivery is synchronous: listeners run on the mutating thread, before the
//! mutation for `before_*` events and after it otherwise.

mod content;
mod event;
mod memory;
mod tree;

pub use content::FileContent;
pub use event::{FileProperty, VfsEvent, VfsListener};
pub use memory::MemoryVfs;
pub use strata_core::{DocumentId, FileId};
pub use tree::{DocumentStore, FileMeta, FileTree, UnsavedDocument};
