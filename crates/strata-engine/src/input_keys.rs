use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use strata_core::FileId;
use strata_storage::{DataExternalizer, PersistentMap, StorageError};

use crate::codec::{FileIdExternalizer, KeyCollectionExternalizer};
use crate::memory_overlay::BufferingListener;

const REVERSE_MAP_CACHE: usize = 256;

/// Reverse index: input id → the keys currently stored for that file.
///
/// Mirrors the forward index and must be updated in the same write-lock
/// section. While the forward overlay buffers, this map buffers too; the
/// buffering flag and the temp map live behind one mutex so their combined
/// state is always observed consistently.
pub struct InputIdToKeys<K> {
    map: PersistentMap<FileId, Vec<K>>,
    overlay: Mutex<ReverseOverlay<K>>,
}

struct ReverseOverlay<K> {
    buffering: bool,
    temp: HashMap<FileId, Vec<K>>,
}

impl<K> InputIdToKeys<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn open(dir: &Path, keys: Arc<dyn DataExternalizer<K>>) -> Result<Self, StorageError> {
        let map = PersistentMap::open(
            dir,
            "input_to_keys",
            Arc::new(FileIdExternalizer),
            Arc::new(KeyCollectionExternalizer::new(keys)),
            REVERSE_MAP_CACHE,
        )?;
        Ok(Self {
            map,
            overlay: Mutex::new(ReverseOverlay {
                buffering: false,
                temp: HashMap::new(),
            }),
        })
    }

    pub fn keys_for(&self, input: FileId) -> Result<Vec<K>, StorageError> {
        {
            let overlay = self.overlay.lock();
            if overlay.buffering {
                if let Some(keys) = overlay.temp.get(&input) {
                    return Ok(keys.clone());
                }
            }
        }
        Ok(self
            .map
            .get(&input)?
            .map(|arc| (*arc).clone())
            .unwrap_or_default())
    }

    /// Replaces the key set recorded for `input`; an empty set removes the
    /// entry (buffered: records the empty set so the deletion is observable).
    pub fn replace(&self, input: FileId, keys: Vec<K>) -> Result<(), StorageError> {
        {
            let mut overlay = self.overlay.lock();
            if overlay.buffering {
                overlay.temp.insert(input, keys);
                return Ok(());
            }
        }
        if keys.is_empty() {
            self.map.remove(&input)
        } else {
            self.map.put(input, keys)
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.map.flush()
    }

    pub fn close(&self) -> Result<(), StorageError> {
        self.map.close()
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.overlay.lock().temp.clear();
        self.map.clear()
    }
}

impl<K> BufferingListener for InputIdToKeys<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn buffering_state_changed(&self, enabled: bool) {
        self.overlay.lock().buffering = enabled;
    }

    fn memory_storage_cleared(&self) {
        self.overlay.lock().temp.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::StringExternalizer;

    fn fid(raw: u32) -> FileId {
        FileId::from_raw(raw)
    }

    fn open(dir: &Path) -> InputIdToKeys<String> {
        InputIdToKeys::open(dir, Arc::new(StringExternalizer)).unwrap()
    }

    #[test]
    fn replace_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let reverse = open(dir.path());

        reverse
            .replace(fid(1), vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(reverse.keys_for(fid(1)).unwrap(), vec!["a", "b"]);

        reverse.replace(fid(1), Vec::new()).unwrap();
        assert!(reverse.keys_for(fid(1)).unwrap().is_empty());
        assert!(!reverse.map.contains_key(&fid(1)));
    }

    #[test]
    fn buffered_replace_is_discarded_on_clear() {
        let dir = tempfile::tempdir().unwrap();
        let reverse = open(dir.path());
        reverse.replace(fid(1), vec!["a".to_string()]).unwrap();

        reverse.buffering_state_changed(true);
        reverse.replace(fid(1), vec!["z".to_string()]).unwrap();
        assert_eq!(reverse.keys_for(fid(1)).unwrap(), vec!["z"]);

        reverse.buffering_state_changed(false);
        reverse.memory_storage_cleared();
        assert_eq!(reverse.keys_for(fid(1)).unwrap(), vec!["a"]);
    }

    #[test]
    fn buffered_empty_set_masks_persistent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let reverse = open(dir.path());
        reverse.replace(fid(1), vec!["a".to_string()]).unwrap();

        reverse.buffering_state_changed(true);
        reverse.replace(fid(1), Vec::new()).unwrap();
        assert!(reverse.keys_for(fid(1)).unwrap().is_empty());
    }
}
