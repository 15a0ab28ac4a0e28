use std::io::{self, Read, Write};
use std::sync::Arc;

use strata_core::FileId;
use strata_storage::{read_varint, write_varint, DataExternalizer};

/// Little-endian `u32` encoding of a [`FileId`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FileIdExternalizer;

impl DataExternalizer<FileId> for FileIdExternalizer {
    fn save(&self, out: &mut dyn Write, value: &FileId) -> io::Result<()> {
        out.write_all(&value.to_raw().to_le_bytes())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<FileId> {
        let mut bytes = [0u8; 4];
        input.read_exact(&mut bytes)?;
        Ok(FileId::from_raw(u32::from_le_bytes(bytes)))
    }
}

/// `[varint size][repeated key]` encoding of the key collection stored in the
/// reverse map, delegating per-key bytes to the extension's key externalizer.
pub struct KeyCollectionExternalizer<K> {
    keys: Arc<dyn DataExternalizer<K>>,
}

impl<K> KeyCollectionExternalizer<K> {
    pub fn new(keys: Arc<dyn DataExternalizer<K>>) -> Self {
        Self { keys }
    }
}

impl<K: Send + Sync> DataExternalizer<Vec<K>> for KeyCollectionExternalizer<K> {
    fn save(&self, out: &mut dyn Write, value: &Vec<K>) -> io::Result<()> {
        write_varint(out, value.len() as u64)?;
        for key in value {
            self.keys.save(out, key)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<Vec<K>> {
        let count = read_varint(input)? as usize;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.keys.read(input)?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::StringExternalizer;

    #[test]
    fn file_id_round_trip() {
        let ext = FileIdExternalizer;
        let mut buf = Vec::new();
        ext.save(&mut buf, &FileId::from_raw(0xDEAD)).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(
            ext.read(&mut buf.as_slice()).unwrap(),
            FileId::from_raw(0xDEAD)
        );
    }

    #[test]
    fn key_collection_round_trip() {
        let ext = KeyCollectionExternalizer::new(Arc::new(StringExternalizer));
        let keys = vec!["a".to_string(), "bb".to_string()];
        let mut buf = Vec::new();
        ext.save(&mut buf, &keys).unwrap();
        assert_eq!(ext.read(&mut buf.as_slice()).unwrap(), keys);
    }
}
