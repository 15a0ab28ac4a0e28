use std::path::Path;
use std::sync::Arc;

use strata_core::FileId;
use strata_storage::{I64Externalizer, PersistentMap, StorageError};

use crate::codec::FileIdExternalizer;

/// Stamp recorded after a null-content update: the file holds no data in the
/// index.
pub const UNINDEXED_STAMP: i64 = -1;
/// Stamp recorded when a file is scheduled for deferred reindexing; never
/// equal to any index creation stamp.
pub const NEEDS_REINDEX_STAMP: i64 = -2;

const STAMP_CACHE: usize = 256;

/// Per-(file, index) persistent stamp deciding whether a file's data in one
/// index is current.
///
/// A file is current exactly when its stamp equals the index's creation
/// stamp, which changes whenever the index is wiped.
pub struct IndexingStamp {
    map: PersistentMap<FileId, i64>,
}

impl IndexingStamp {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let map = PersistentMap::open(
            dir,
            "stamps",
            Arc::new(FileIdExternalizer),
            Arc::new(I64Externalizer),
            STAMP_CACHE,
        )?;
        Ok(Self { map })
    }

    pub fn get(&self, file: FileId) -> Result<Option<i64>, StorageError> {
        Ok(self.map.get(&file)?.map(|arc| *arc))
    }

    pub fn set(&self, file: FileId, stamp: i64) -> Result<(), StorageError> {
        self.map.put(file, stamp)
    }

    pub fn is_current(&self, file: FileId, creation_stamp: i64) -> bool {
        matches!(self.get(file), Ok(Some(stamp)) if stamp == creation_stamp)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.map.flush()
    }

    pub fn close(&self) -> Result<(), StorageError> {
        self.map.close()
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.map.clear()
    }
}
