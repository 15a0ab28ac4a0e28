use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::StorageError;

const VERSION_FILE: &str = "version";
const REGISTERED_FILE: &str = "registered";
const CORRUPTION_MARKER: &str = "corruption.marker";
const SESSION_MARKER: &str = "session.marker";

/// Outcome of registering an index against its on-disk directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No version file existed; a fresh directory was initialized.
    Fresh,
    /// The stored version matches; existing data is reused.
    Reopened,
    /// The directory was wiped (corruption or version mismatch) and the
    /// version file rewritten.
    Rebuilt,
}

/// Manages the on-disk root holding one directory per index.
///
/// Layout:
/// ```text
/// <root>/registered           names registered by the previous session
/// <root>/corruption.marker    presence forces a full rebuild
/// <root>/session.marker       present while a session is running
/// <root>/<index>/version      format version + creation stamp
/// <root>/<index>/...          persistent map files owned by the index
/// ```
#[derive(Debug)]
pub struct VersionedStore {
    root: PathBuf,
}

impl VersionedStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn version_file(&self, name: &str) -> PathBuf {
        self.index_dir(name).join(VERSION_FILE)
    }

    /// Prepares the directory for `name`, wiping it when `corrupted` is set or
    /// the stored version differs from `version`.
    pub fn register_index(
        &self,
        name: &str,
        version: u32,
        corrupted: bool,
    ) -> Result<RegisterOutcome, StorageError> {
        let version_file = self.version_file(name);
        let existed = version_file.exists();

        if corrupted || self.version_differs(name, version) {
            if !corrupted && existed {
                tracing::info!(
                    target = "strata.storage",
                    index = name,
                    version,
                    "stored format version differs; index will be rebuilt"
                );
            }
            self.delete_index_dir(name)?;
            self.rewrite_version(name, version)?;
            return Ok(if existed || corrupted {
                RegisterOutcome::Rebuilt
            } else {
                RegisterOutcome::Fresh
            });
        }

        Ok(RegisterOutcome::Reopened)
    }

    /// Returns `true` when the stored version is absent, unreadable, or
    /// different from `version`.
    pub fn version_differs(&self, name: &str, version: u32) -> bool {
        match self.read_version(name) {
            Ok(Some((stored, _))) => stored != version,
            _ => true,
        }
    }

    /// Rewrites the version file with a fresh creation stamp.
    pub fn rewrite_version(&self, name: &str, version: u32) -> Result<(), StorageError> {
        let dir = self.index_dir(name);
        fs::create_dir_all(&dir)?;
        let mut file = File::create(self.version_file(name))?;
        file.write_i32::<LittleEndian>(version as i32)?;
        file.write_i64::<LittleEndian>(now_millis())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_version(&self, name: &str) -> Result<Option<(u32, i64)>, StorageError> {
        let path = self.version_file(name);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let version = file.read_i32::<LittleEndian>()? as u32;
        let stamp = file.read_i64::<LittleEndian>()?;
        Ok(Some((version, stamp)))
    }

    /// The creation stamp written when the index was last (re)initialized.
    pub fn creation_stamp(&self, name: &str) -> Result<i64, StorageError> {
        match self.read_version(name)? {
            Some((_, stamp)) => Ok(stamp),
            None => Err(StorageError::InvalidHeader("missing version file")),
        }
    }

    pub fn delete_index_dir(&self, name: &str) -> Result<(), StorageError> {
        let dir = self.index_dir(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Records the full set of registered index names.
    ///
    /// Best effort: failures are logged, not surfaced, since the sidecar only
    /// drives startup garbage collection.
    pub fn save_registered(&self, names: &[&str]) {
        let write = || -> io::Result<()> {
            let file = File::create(self.root.join(REGISTERED_FILE))?;
            let mut out = BufWriter::new(file);
            out.write_u32::<LittleEndian>(names.len() as u32)?;
            for name in names {
                out.write_u32::<LittleEndian>(name.len() as u32)?;
                out.write_all(name.as_bytes())?;
            }
            out.flush()
        };
        if let Err(err) = write() {
            tracing::warn!(
                target = "strata.storage",
                error = %err,
                "failed to save registered index names"
            );
        }
    }

    /// Reads the names recorded by [`VersionedStore::save_registered`].
    ///
    /// Unreadable or missing sidecars yield an empty set.
    pub fn read_registered(&self) -> HashSet<String> {
        let read = || -> io::Result<HashSet<String>> {
            let file = File::open(self.root.join(REGISTERED_FILE))?;
            let mut input = BufReader::new(file);
            let count = input.read_u32::<LittleEndian>()?;
            let mut names = HashSet::with_capacity(count as usize);
            for _ in 0..count {
                let len = input.read_u32::<LittleEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                input.read_exact(&mut bytes)?;
                let name = String::from_utf8(bytes)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                names.insert(name);
            }
            Ok(names)
        };
        read().unwrap_or_default()
    }

    /// Deletes directories of indices registered by a previous session that
    /// are unknown now.
    pub fn drop_unregistered(&self, current: &HashSet<&str>) {
        let mut stale = self.read_registered();
        stale.retain(|name| !current.contains(name.as_str()));
        for name in stale {
            tracing::info!(
                target = "strata.storage",
                index = %name,
                "dropping directory of unregistered index"
            );
            if let Err(err) = self.delete_index_dir(&name) {
                tracing::warn!(
                    target = "strata.storage",
                    index = %name,
                    error = %err,
                    "failed to drop unregistered index directory"
                );
            }
        }
    }

    pub fn corruption_marker_present(&self) -> bool {
        self.root.join(CORRUPTION_MARKER).exists()
    }

    pub fn create_corruption_marker(&self) -> io::Result<()> {
        File::create(self.root.join(CORRUPTION_MARKER)).map(|_| ())
    }

    pub fn delete_corruption_marker(&self) {
        let _ = fs::remove_file(self.root.join(CORRUPTION_MARKER));
    }

    pub fn session_marker_present(&self) -> bool {
        self.root.join(SESSION_MARKER).exists()
    }

    pub fn create_session_marker(&self) -> io::Result<()> {
        File::create(self.root.join(SESSION_MARKER)).map(|_| ())
    }

    pub fn delete_session_marker(&self) {
        let _ = fs::remove_file(self.root.join(SESSION_MARKER));
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
