use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use strata_core::FileId;
use strata_storage::StorageError;
use strata_vfs::FileContent;

use crate::extension::IndexExtension;
use crate::input_keys::InputIdToKeys;
use crate::memory_overlay::{BufferingListener, MemoryOverlay};
use crate::value_container::ValueContainer;

/// One index: the buffered forward storage plus the reverse map, guarded by a
/// per-index readers–writer lock. Readers do not block readers.
pub struct UpdatableIndex<K, V> {
    name: String,
    extension: Arc<dyn IndexExtension<K, V>>,
    storage: Arc<MemoryOverlay<K, V>>,
    input_to_keys: Arc<InputIdToKeys<K>>,
    lock: RwLock<()>,
}

/// Read-locked view handed to multi-step query closures so they observe one
/// consistent snapshot without re-acquiring the index lock per key.
pub struct IndexReader<'a, K, V> {
    storage: &'a MemoryOverlay<K, V>,
}

impl<K, V> IndexReader<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Clone + Send + Sync,
{
    pub fn data(&self, key: &K) -> Result<ValueContainer<V>, StorageError> {
        self.storage.read(key)
    }
}

impl<K, V> UpdatableIndex<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        extension: Arc<dyn IndexExtension<K, V>>,
        storage: MemoryOverlay<K, V>,
        input_to_keys: InputIdToKeys<K>,
    ) -> Arc<Self> {
        let storage = Arc::new(storage);
        let input_to_keys = Arc::new(input_to_keys);
        // The reverse map buffers whenever the forward storage does.
        storage.add_buffering_listener(input_to_keys.clone());
        Arc::new(Self {
            name: extension.name().to_string(),
            extension,
            storage,
            input_to_keys,
            lock: RwLock::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn extension(&self) -> &Arc<dyn IndexExtension<K, V>> {
        &self.extension
    }

    pub(crate) fn add_buffering_listener(&self, listener: Arc<dyn BufferingListener>) {
        self.storage.add_buffering_listener(listener);
    }

    /// Recomputes the data of `input` and reconciles both maps.
    ///
    /// `None` content means the file no longer contributes anything: every
    /// prior association is removed and the reverse entry dropped. Errors
    /// leave the index inconsistent and must escalate to a rebuild.
    pub fn update(&self, input: FileId, content: Option<&FileContent>) -> Result<(), StorageError> {
        let new_data = content
            .map(|c| self.extension.index(c))
            .unwrap_or_default();

        let _write = self.lock.write();
        let old_keys = self.input_to_keys.keys_for(input)?;
        for key in &old_keys {
            self.storage.remove_all_values(key, input)?;
        }

        let mut new_keys = Vec::with_capacity(new_data.len());
        for (key, value) in &new_data {
            self.storage.add_value(key, input, value)?;
            new_keys.push(key.clone());
        }
        self.input_to_keys.replace(input, new_keys)
    }

    pub fn data(&self, key: &K) -> Result<ValueContainer<V>, StorageError> {
        let _read = self.lock.read();
        self.storage.read(key)
    }

    /// Runs `f` with the read lock held for its whole duration.
    pub fn with_read<R, E>(
        &self,
        f: impl FnOnce(&IndexReader<'_, K, V>) -> Result<R, E>,
    ) -> Result<R, E> {
        let _read = self.lock.read();
        f(&IndexReader {
            storage: &self.storage,
        })
    }

    pub fn process_all_keys(&self, f: &mut dyn FnMut(&K) -> bool) -> Result<bool, StorageError> {
        let _read = self.lock.read();
        self.storage.process_keys(f)
    }

    /// The keys currently recorded for `input` in the reverse map.
    pub fn indexed_keys(&self, input: FileId) -> Result<Vec<K>, StorageError> {
        let _read = self.lock.read();
        self.input_to_keys.keys_for(input)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let _write = self.lock.write();
        self.storage.clear()?;
        self.input_to_keys.clear()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        let _read = self.lock.read();
        self.storage.flush()?;
        self.input_to_keys.flush()
    }

    pub fn dispose(&self) -> Result<(), StorageError> {
        let _write = self.lock.write();
        self.storage.close()?;
        self.input_to_keys.close()
    }

    pub(crate) fn set_buffering(&self, enabled: bool) {
        let _write = self.lock.write();
        self.storage.set_buffering(enabled);
    }

    pub fn is_buffering(&self) -> bool {
        self.storage.is_buffering()
    }
}
