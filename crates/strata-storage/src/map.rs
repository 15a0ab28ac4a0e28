use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;

use crate::codec::DataExternalizer;
use crate::StorageError;

const SNAPSHOT_MAGIC: [u8; 8] = *b"STRMAP1\x01";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 8 + 8;

const OP_PUT: u8 = 1;
const OP_REMOVE: u8 = 2;

/// A durable key→value map.
///
/// Values are kept in their serialized form and decoded on demand through a
/// bounded LRU cache sized by the owning index extension. Mutations are
/// appended to a write-ahead log; [`PersistentMap::close`] folds the log into
/// a fresh snapshot.
pub struct PersistentMap<K, V> {
    map_path: PathBuf,
    log_path: PathBuf,
    key_ext: Arc<dyn DataExternalizer<K>>,
    value_ext: Arc<dyn DataExternalizer<V>>,
    inner: Mutex<MapInner<K>>,
    cache: Mutex<DecodeCache<K, V>>,
}

impl<K, V> std::fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentMap")
            .field("map_path", &self.map_path)
            .field("log_path", &self.log_path)
            .finish()
    }
}

struct MapInner<K> {
    entries: HashMap<K, Vec<u8>>,
    log: BufWriter<File>,
    dirty: bool,
}

struct DecodeCache<K, V> {
    map: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> DecodeCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: &K) -> Option<Arc<V>> {
        let value = self.map.get(key)?.clone();
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
        Some(value)
    }

    fn insert(&mut self, key: K, value: Arc<V>) {
        if self.map.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        } else if let Some(pos) = self.order.iter().position(|k| k == &key) {
            self.order.remove(pos);
            self.order.push_back(key);
        }
        while self.map.len() > self.capacity {
            let Some(evicted) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&evicted);
        }
    }

    fn remove(&mut self, key: &K) {
        if self.map.remove(key).is_some() {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

impl<K, V> PersistentMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Send + Sync,
{
    /// Opens (or creates) the map stored as `<dir>/<name>.map` + `<dir>/<name>.log`.
    pub fn open(
        dir: &Path,
        name: &str,
        key_ext: Arc<dyn DataExternalizer<K>>,
        value_ext: Arc<dyn DataExternalizer<V>>,
        cache_capacity: usize,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let map_path = dir.join(format!("{name}.map"));
        let log_path = dir.join(format!("{name}.log"));

        let mut entries = if map_path.exists() {
            read_snapshot(&map_path, key_ext.as_ref())?
        } else {
            HashMap::new()
        };

        if log_path.exists() {
            replay_log(&log_path, key_ext.as_ref(), &mut entries)?;
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            map_path,
            log_path,
            key_ext,
            value_ext,
            inner: Mutex::new(MapInner {
                entries,
                log: BufWriter::new(log),
                dirty: false,
            }),
            cache: Mutex::new(DecodeCache::new(cache_capacity)),
        })
    }

    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, StorageError> {
        if let Some(hit) = self.cache.lock().get(key) {
            return Ok(Some(hit));
        }

        let inner = self.inner.lock();
        let Some(bytes) = inner.entries.get(key) else {
            return Ok(None);
        };
        let value = self.value_ext.read(&mut Cursor::new(bytes.as_slice()))?;
        let value = Arc::new(value);
        self.cache.lock().insert(key.clone(), value.clone());
        Ok(Some(value))
    }

    pub fn put(&self, key: K, value: V) -> Result<(), StorageError> {
        let mut value_bytes = Vec::new();
        self.value_ext.save(&mut value_bytes, &value)?;
        let mut key_bytes = Vec::new();
        self.key_ext.save(&mut key_bytes, &key)?;

        let mut inner = self.inner.lock();
        inner.log.write_all(&[OP_PUT])?;
        inner.log.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
        inner.log.write_all(&key_bytes)?;
        inner.log.write_u32::<LittleEndian>(value_bytes.len() as u32)?;
        inner.log.write_all(&value_bytes)?;
        inner.dirty = true;
        inner.entries.insert(key.clone(), value_bytes);
        self.cache.lock().insert(key, Arc::new(value));
        Ok(())
    }

    pub fn remove(&self, key: &K) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.entries.remove(key).is_none() {
            return Ok(());
        }
        let mut key_bytes = Vec::new();
        self.key_ext.save(&mut key_bytes, key)?;
        inner.log.write_all(&[OP_REMOVE])?;
        inner.log.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
        inner.log.write_all(&key_bytes)?;
        inner.dirty = true;
        self.cache.lock().remove(key);
        Ok(())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every key; stops early and returns `false` when the visitor does.
    pub fn process_keys(&self, f: &mut dyn FnMut(&K) -> bool) -> Result<bool, StorageError> {
        let keys: Vec<K> = self.inner.lock().entries.keys().cloned().collect();
        for key in &keys {
            if !f(key) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Makes the write-ahead log durable. Cheap when nothing changed.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if !inner.dirty {
            return Ok(());
        }
        inner.log.flush()?;
        inner.log.get_ref().sync_data()?;
        inner.dirty = false;
        Ok(())
    }

    /// Folds the log into a fresh snapshot and truncates the log.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();

        let mut payload = Vec::new();
        for (key, value_bytes) in &inner.entries {
            let mut key_bytes = Vec::new();
            self.key_ext.save(&mut key_bytes, key)?;
            payload.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
            payload.write_all(&key_bytes)?;
            payload.write_u32::<LittleEndian>(value_bytes.len() as u32)?;
            payload.write_all(value_bytes)?;
        }

        let header = encode_header(inner.entries.len() as u64, content_hash(&payload));
        atomic_write(&self.map_path, &header, &payload)?;

        inner.log.flush()?;
        inner.log.get_ref().set_len(0)?;
        inner.log.get_ref().sync_data()?;
        inner.dirty = false;
        Ok(())
    }

    /// Drops all entries and deletes the backing files.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.log.flush()?;
        inner.log.get_ref().set_len(0)?;
        inner.log.get_ref().sync_data()?;
        inner.dirty = false;
        match fs::remove_file(&self.map_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.cache.lock().clear();
        Ok(())
    }
}

impl<K, V> Drop for PersistentMap<K, V> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.dirty {
            if let Err(err) = inner.log.flush() {
                tracing::warn!(
                    target = "strata.storage",
                    path = %self.log_path.display(),
                    error = %err,
                    "failed to flush write-ahead log on drop"
                );
            }
        }
    }
}

fn encode_header(count: u64, hash: u64) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    let mut w = Cursor::new(buf.as_mut_slice());
    w.write_all(&SNAPSHOT_MAGIC).expect("in-memory write");
    w.write_u32::<LittleEndian>(FORMAT_VERSION)
        .expect("in-memory write");
    w.write_u64::<LittleEndian>(count).expect("in-memory write");
    w.write_u64::<LittleEndian>(hash).expect("in-memory write");
    buf
}

fn content_hash(payload: &[u8]) -> u64 {
    let hash_bytes = blake3::hash(payload);
    u64::from_le_bytes(hash_bytes.as_bytes()[..8].try_into().expect("hash slice"))
}

fn read_snapshot<K: Eq + Hash>(
    path: &Path,
    key_ext: &dyn DataExternalizer<K>,
) -> Result<HashMap<K, Vec<u8>>, StorageError> {
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::Truncated {
            expected: HEADER_LEN as u64,
            found: bytes.len() as u64,
        });
    }

    let mut r = Cursor::new(&bytes[..HEADER_LEN]);
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(StorageError::InvalidHeader("bad magic"));
    }
    let format = r.read_u32::<LittleEndian>()?;
    if format != FORMAT_VERSION {
        return Err(StorageError::WrongFormat {
            expected: FORMAT_VERSION,
            found: format,
        });
    }
    let count = r.read_u64::<LittleEndian>()?;
    let expected_hash = r.read_u64::<LittleEndian>()?;

    let payload = &bytes[HEADER_LEN..];
    let found_hash = content_hash(payload);
    if found_hash != expected_hash {
        return Err(StorageError::HashMismatch {
            expected: expected_hash,
            found: found_hash,
        });
    }

    let mut entries = HashMap::with_capacity(count as usize);
    let mut cursor = Cursor::new(payload);
    for _ in 0..count {
        let key_len = cursor.read_u32::<LittleEndian>()? as usize;
        let mut key_bytes = vec![0u8; key_len];
        cursor.read_exact(&mut key_bytes)?;
        let key = key_ext.read(&mut Cursor::new(key_bytes.as_slice()))?;
        let value_len = cursor.read_u32::<LittleEndian>()? as usize;
        let mut value_bytes = vec![0u8; value_len];
        cursor.read_exact(&mut value_bytes)?;
        entries.insert(key, value_bytes);
    }
    Ok(entries)
}

/// Replays the write-ahead log into `entries`.
///
/// A torn record at the tail is discarded and the file is truncated to the
/// last complete record.
fn replay_log<K: Eq + Hash>(
    path: &Path,
    key_ext: &dyn DataExternalizer<K>,
    entries: &mut HashMap<K, Vec<u8>>,
) -> Result<(), StorageError> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor::new(bytes.as_slice());
    let mut last_good = 0u64;

    loop {
        let mut op = [0u8; 1];
        match cursor.read_exact(&mut op) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }

        match read_log_record(&mut cursor, key_ext, op[0], entries) {
            Ok(()) => last_good = cursor.position(),
            Err(err) => {
                tracing::warn!(
                    target = "strata.storage",
                    path = %path.display(),
                    offset = last_good,
                    error = %err,
                    "discarding torn write-ahead log tail"
                );
                break;
            }
        }
    }

    if last_good < bytes.len() as u64 {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(last_good)?;
        file.sync_data()?;
    }
    Ok(())
}

fn read_log_record<K: Eq + Hash>(
    cursor: &mut Cursor<&[u8]>,
    key_ext: &dyn DataExternalizer<K>,
    op: u8,
    entries: &mut HashMap<K, Vec<u8>>,
) -> io::Result<()> {
    let key_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut key_bytes = vec![0u8; key_len];
    cursor.read_exact(&mut key_bytes)?;
    let key = key_ext.read(&mut Cursor::new(key_bytes.as_slice()))?;

    match op {
        OP_PUT => {
            let value_len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut value_bytes = vec![0u8; value_len];
            cursor.read_exact(&mut value_bytes)?;
            entries.insert(key, value_bytes);
            Ok(())
        }
        OP_REMOVE => {
            entries.remove(&key);
            Ok(())
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown log op {other}"),
        )),
    }
}

fn atomic_write(dest: &Path, header: &[u8], payload: &[u8]) -> Result<(), StorageError> {
    let tmp_path = dest.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(header)?;
        file.write_all(payload)?;
        file.sync_all()?;
    }

    match fs::rename(&tmp_path, dest) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists || dest.exists() => {
            // On Windows, rename doesn't overwrite. Try remove + rename.
            let _ = fs::remove_file(dest);
            fs::rename(&tmp_path, dest).map_err(StorageError::from)
        }
        Err(err) => Err(StorageError::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{StringExternalizer, U32Externalizer};

    fn open_map(dir: &Path) -> PersistentMap<String, u32> {
        PersistentMap::open(
            dir,
            "storage",
            Arc::new(StringExternalizer),
            Arc::new(U32Externalizer),
            16,
        )
        .unwrap()
    }

    #[test]
    fn put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let map = open_map(dir.path());

        map.put("a".to_string(), 1).unwrap();
        map.put("b".to_string(), 2).unwrap();
        assert_eq!(*map.get(&"a".to_string()).unwrap().unwrap(), 1);
        assert_eq!(*map.get(&"b".to_string()).unwrap().unwrap(), 2);

        map.remove(&"a".to_string()).unwrap();
        assert!(map.get(&"a".to_string()).unwrap().is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn survives_reopen_via_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = open_map(dir.path());
            map.put("a".to_string(), 1).unwrap();
            map.put("b".to_string(), 2).unwrap();
            map.remove(&"b".to_string()).unwrap();
            map.flush().unwrap();
        }

        let map = open_map(dir.path());
        assert_eq!(*map.get(&"a".to_string()).unwrap().unwrap(), 1);
        assert!(map.get(&"b".to_string()).unwrap().is_none());
    }

    #[test]
    fn survives_reopen_via_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = open_map(dir.path());
            map.put("a".to_string(), 7).unwrap();
            map.close().unwrap();
        }

        assert!(dir.path().join("storage.map").exists());
        let log_len = fs::metadata(dir.path().join("storage.log")).unwrap().len();
        assert_eq!(log_len, 0);

        let map = open_map(dir.path());
        assert_eq!(*map.get(&"a".to_string()).unwrap().unwrap(), 7);
    }

    #[test]
    fn torn_log_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = open_map(dir.path());
            map.put("a".to_string(), 1).unwrap();
            map.put("b".to_string(), 2).unwrap();
            map.flush().unwrap();
        }

        let log_path = dir.path().join("storage.log");
        let bytes = fs::read(&log_path).unwrap();
        fs::write(&log_path, &bytes[..bytes.len() - 3]).unwrap();

        let map = open_map(dir.path());
        assert_eq!(*map.get(&"a".to_string()).unwrap().unwrap(), 1);
        assert!(map.get(&"b".to_string()).unwrap().is_none());
    }

    #[test]
    fn corrupted_snapshot_is_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = open_map(dir.path());
            map.put("a".to_string(), 1).unwrap();
            map.close().unwrap();
        }

        let map_path = dir.path().join("storage.map");
        let mut bytes = fs::read(&map_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&map_path, &bytes).unwrap();

        let err = PersistentMap::<String, u32>::open(
            dir.path(),
            "storage",
            Arc::new(StringExternalizer),
            Arc::new(U32Externalizer),
            16,
        )
        .unwrap_err();
        match err {
            StorageError::HashMismatch { expected, found } => assert_ne!(expected, found),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clear_deletes_backing_files() {
        let dir = tempfile::tempdir().unwrap();
        let map = open_map(dir.path());
        map.put("a".to_string(), 1).unwrap();
        map.close().unwrap();
        assert!(dir.path().join("storage.map").exists());

        map.clear().unwrap();
        assert!(!dir.path().join("storage.map").exists());
        assert_eq!(fs::metadata(dir.path().join("storage.log")).unwrap().len(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn decode_cache_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let map: PersistentMap<String, u32> = PersistentMap::open(
            dir.path(),
            "storage",
            Arc::new(StringExternalizer),
            Arc::new(U32Externalizer),
            2,
        )
        .unwrap();

        for i in 0..10u32 {
            map.put(format!("k{i}"), i).unwrap();
        }
        assert!(map.cache.lock().map.len() <= 2);
        for i in 0..10u32 {
            assert_eq!(*map.get(&format!("k{i}")).unwrap().unwrap(), i);
        }
    }
}
