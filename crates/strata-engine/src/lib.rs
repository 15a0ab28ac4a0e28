//! Persistent file-based inverted-index engine.
//!
//! The engine maintains many named indices mapping extension-defined keys to
//! values, each value annotated with the set of files it was extracted from.
//! It answers "all keys", "values for key" and "files containing all of
//! {k1..kn}" queries while absorbing a stream of file change events and
//! keeping every index consistent with the files actually on disk.
//!
//! ## Architecture
//!
//! Writes flow change listener → [`UpdatableIndex`] → [`MemoryOverlay`] →
//! persistent map, with the input-id→keys reverse map updated in the same
//! write-lock section. Reads flow query → `ensure_up_to_date` (drains the
//! collector, applies unsaved editor buffers) → index under a read lock.
//!
//! The embedder supplies the virtual-file layer (`strata-vfs`), the index
//! extensions ([`IndexExtension`]) and host hooks ([`IndexHost`]); everything
//! else is owned by [`IndexService`].

mod codec;
mod collector;
mod config;
mod error;
mod extension;
mod flush;
mod host;
mod input_keys;
mod memory_overlay;
mod registry;
mod scan;
mod scope;
mod service;
mod stamp;
mod unsaved;
mod updatable_index;
mod value_container;

pub use codec::{FileIdExternalizer, KeyCollectionExternalizer};
pub use config::IndexingConfig;
pub use error::{IndexError, RegisterError};
pub use extension::{IndexExtension, IndexKey, DEFAULT_CACHE_SIZE};
pub use host::{DefaultHost, DumbModePolicy, IndexHost};
pub use input_keys::InputIdToKeys;
pub use memory_overlay::{BufferingListener, MemoryOverlay};
pub use registry::{IndexRegistry, RebuildStatus};
pub use scope::{IndexableFileSet, PathPrefixSet, SearchScope};
pub use service::{
    disable_up_to_date_check_for_current_thread, enable_up_to_date_check_for_current_thread,
    IndexService, IndexServiceBuilder,
};
pub use stamp::{IndexingStamp, NEEDS_REINDEX_STAMP, UNINDEXED_STAMP};
pub use updatable_index::{IndexReader, UpdatableIndex};
pub use value_container::{ContainerExternalizer, ValueContainer};

pub use strata_core::{Cancelled, DocumentId, FileId, ProjectId};
