use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use strata_storage::DataExternalizer;
use strata_vfs::{FileContent, FileMeta};

pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Opaque typed name of one index.
///
/// The key carries the key/value types as witnesses so heterogeneous indices
/// can live in one registry and still be queried with their concrete types.
pub struct IndexKey<K, V> {
    name: &'static str,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> IndexKey<K, V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<K, V> Clone for IndexKey<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for IndexKey<K, V> {}

impl<K, V> fmt::Debug for IndexKey<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", self.name)
    }
}

/// Everything the engine consumes from one registered indexer.
///
/// Key hashing and equality come from the `K: Eq + Hash` bounds at the
/// registration site; the externalizers only describe the wire format.
pub trait IndexExtension<K, V>: Send + Sync {
    fn name(&self) -> &str;

    /// Bumping the version wipes and rebuilds the index on next startup.
    fn version(&self) -> u32;

    /// Maps one input file to the key/value pairs it contributes.
    fn index(&self, content: &FileContent) -> HashMap<K, V>;

    fn key_externalizer(&self) -> Arc<dyn DataExternalizer<K>>;

    fn value_externalizer(&self) -> Arc<dyn DataExternalizer<V>>;

    /// Whether `file` is an input of this index at all.
    fn accept_input(&self, file: &FileMeta) -> bool;

    /// Content-less indices (`false`) are updated synchronously inside the
    /// change listener and never schedule deferred reindexing.
    fn depends_on_file_content(&self) -> bool {
        true
    }

    /// Capacity of the decoded-value cache of the backing map.
    fn cache_size(&self) -> usize {
        DEFAULT_CACHE_SIZE
    }

    /// Files for which the engine-wide content size limit does not apply.
    fn size_limit_exempt(&self, file: &FileMeta) -> bool {
        let _ = file;
        false
    }
}
