use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use strata_core::FileId;
use strata_storage::{PersistentMap, StorageError};

use crate::value_container::ValueContainer;

/// Observer of the overlay's buffering state, used to keep auxiliary
/// structures (the reverse map, unsaved-document bookkeeping) in lockstep.
pub trait BufferingListener: Send + Sync {
    fn buffering_state_changed(&self, enabled: bool);
    fn memory_storage_cleared(&self);
}

/// Buffering layer over the durable forward map.
///
/// In passthrough mode every operation goes straight to the backing
/// [`PersistentMap`]. In buffering mode reads consult an in-memory change map
/// first and writes go only there; a key's change-map entry is seeded from the
/// backend on first touch so a buffered read always observes a complete
/// container. Recording an empty container is how a buffered delete is
/// expressed.
///
/// Leaving buffering mode discards the change map without flushing: buffered
/// state mirrors transient editor content and must never reach disk.
pub struct MemoryOverlay<K, V> {
    backend: PersistentMap<K, ValueContainer<V>>,
    buffering: AtomicBool,
    memory: Mutex<HashMap<K, ValueContainer<V>>>,
    listeners: Mutex<Vec<Arc<dyn BufferingListener>>>,
}

impl<K, V> MemoryOverlay<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Clone + Send + Sync,
{
    pub fn new(backend: PersistentMap<K, ValueContainer<V>>) -> Self {
        Self {
            backend,
            buffering: AtomicBool::new(false),
            memory: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add_buffering_listener(&self, listener: Arc<dyn BufferingListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::SeqCst)
    }

    /// Switches buffering mode, discarding the change map when leaving it.
    pub fn set_buffering(&self, enabled: bool) {
        let was = self.buffering.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }
        if !enabled {
            self.memory.lock().clear();
        }
        let listeners: Vec<Arc<dyn BufferingListener>> = self.listeners.lock().clone();
        for listener in &listeners {
            listener.buffering_state_changed(enabled);
        }
        if !enabled {
            for listener in &listeners {
                listener.memory_storage_cleared();
            }
        }
    }

    pub fn read(&self, key: &K) -> Result<ValueContainer<V>, StorageError> {
        if self.is_buffering() {
            if let Some(container) = self.memory.lock().get(key) {
                return Ok(container.clone());
            }
        }
        Ok(self
            .backend
            .get(key)?
            .map(|arc| (*arc).clone())
            .unwrap_or_default())
    }

    pub fn add_value(&self, key: &K, input: FileId, value: &V) -> Result<(), StorageError> {
        if self.is_buffering() {
            let mut memory = self.memory.lock();
            self.seeded_entry(&mut memory, key)?.add(input, value.clone());
            return Ok(());
        }
        let mut container = self
            .backend
            .get(key)?
            .map(|arc| (*arc).clone())
            .unwrap_or_default();
        container.add(input, value.clone());
        self.backend.put(key.clone(), container)
    }

    pub fn remove_all_values(&self, key: &K, input: FileId) -> Result<(), StorageError> {
        if self.is_buffering() {
            let mut memory = self.memory.lock();
            self.seeded_entry(&mut memory, key)?.remove_associated(input);
            return Ok(());
        }
        let Some(existing) = self.backend.get(key)? else {
            return Ok(());
        };
        let mut container = (*existing).clone();
        container.remove_associated(input);
        if container.is_empty() {
            self.backend.remove(key)
        } else {
            self.backend.put(key.clone(), container)
        }
    }

    /// Visits every key with a (possibly buffered) non-empty container.
    pub fn process_keys(&self, f: &mut dyn FnMut(&K) -> bool) -> Result<bool, StorageError> {
        if !self.is_buffering() {
            return self.backend.process_keys(f);
        }

        let memory = self.memory.lock();
        let mut seen: HashSet<K> = HashSet::new();
        for (key, container) in memory.iter() {
            seen.insert(key.clone());
            if !container.is_empty() && !f(key) {
                return Ok(false);
            }
        }
        drop(memory);
        self.backend.process_keys(&mut |key| {
            if seen.contains(key) {
                return true;
            }
            f(key)
        })
    }

    fn seeded_entry<'a>(
        &self,
        memory: &'a mut HashMap<K, ValueContainer<V>>,
        key: &K,
    ) -> Result<&'a mut ValueContainer<V>, StorageError> {
        if !memory.contains_key(key) {
            let seed = self
                .backend
                .get(key)?
                .map(|arc| (*arc).clone())
                .unwrap_or_default();
            memory.insert(key.clone(), seed);
        }
        Ok(memory.get_mut(key).expect("entry inserted above"))
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.backend.flush()
    }

    pub fn close(&self) -> Result<(), StorageError> {
        self.backend.close()
    }

    /// Wipes both the durable map and the change map.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.memory.lock().clear();
        self.backend.clear()
    }
}
