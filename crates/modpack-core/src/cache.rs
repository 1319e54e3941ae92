use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::{NamedTempFile, TempDir};

use crate::backend::CacheKey;
use crate::checksum::{self, Checksum};
use crate::config::CacheLocation;
use crate::error::{PackError, Result};

const DATA_SUFFIX: &str = "dat";
const SUMS_SUFFIX: &str = "sum";

/// Filesystem store for downloaded files and their checksum sidecars.
///
/// An entry exists iff its data file exists. The sidecar is an append-only
/// log of `algorithm:hexdigest` lines, extended by every download of the
/// entry before its data file is published.
pub struct CacheStore {
    root: PathBuf,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    _temp: Option<TempDir>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::default(),
            _temp: None,
        }
    }

    /// Store backed by a temporary directory that is removed on drop.
    pub fn ephemeral() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("modpacker-cache")
            .tempdir()
            .map_err(|source| PackError::io(std::env::temp_dir(), source))?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            locks: Mutex::default(),
            _temp: Some(temp),
        })
    }

    pub fn open(location: &CacheLocation) -> Result<Self> {
        match location {
            CacheLocation::Ephemeral => Self::ephemeral(),
            CacheLocation::Dir(dir) => {
                fs::create_dir_all(dir).map_err(|source| PackError::io(dir, source))?;
                Ok(Self::new(dir.clone()))
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key)
            .join(format!("{}.{DATA_SUFFIX}", key.base()))
    }

    pub fn sums_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key)
            .join(format!("{}.{SUMS_SUFFIX}", key.base()))
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        let path = self.data_path(key);
        match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PackError::io(path, source)),
        }
    }

    pub fn open_data(&self, key: &CacheKey) -> Result<File> {
        let path = self.data_path(key);
        File::open(&path).map_err(|source| PackError::io(path, source))
    }

    /// Starts writing a data file. Nothing is visible under the key until
    /// [`PendingEntry::commit`] succeeds.
    pub fn begin(&self, key: &CacheKey) -> Result<PendingEntry> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir).map_err(|source| PackError::io(&dir, source))?;
        let file = NamedTempFile::new_in(&dir).map_err(|source| PackError::io(&dir, source))?;
        Ok(PendingEntry {
            file,
            dest: self.data_path(key),
        })
    }

    pub fn append_sums(&self, key: &CacheKey, sums: &[Checksum]) -> Result<()> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir).map_err(|source| PackError::io(&dir, source))?;
        let path = self.sums_path(key);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PackError::io(&path, source))?;
        let mut writer = BufWriter::new(file);
        let mut lines = String::new();
        for sum in sums {
            lines.push_str(sum.as_str());
            lines.push('\n');
        }
        writer
            .write_all(lines.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| PackError::io(path, source))
    }

    /// Every checksum recorded for the entry, oldest first. A missing
    /// sidecar reads as an empty record.
    pub fn read_sums(&self, key: &CacheKey) -> Result<Vec<Checksum>> {
        let path = self.sums_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(checksum::parse_sidecar(&contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(PackError::io(path, source)),
        }
    }

    /// Removes every cached entry.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PackError::io(&self.root, source)),
        }
    }

    /// Records `sums` for the entry, then moves the pending data file into
    /// place. A visible data file therefore always has its sums recorded.
    pub fn publish(&self, key: &CacheKey, pending: PendingEntry, sums: &[Checksum]) -> Result<()> {
        self.append_sums(key, sums)?;
        pending.commit()
    }

    /// Lock serializing writers of one key.
    pub(crate) fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks.lock().entry(key.clone()).or_default().clone()
    }

    /// Hands back a lock from [`key_lock`](Self::key_lock), dropping the table
    /// entry once no other caller holds it.
    pub(crate) fn release_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the table, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        key.dir()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

/// Data file being written for a cache entry.
pub struct PendingEntry {
    file: NamedTempFile,
    dest: PathBuf,
}

impl PendingEntry {
    pub fn as_file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Atomically moves the written file into place.
    pub fn commit(self) -> Result<()> {
        let dest = self.dest;
        self.file
            .persist(&dest)
            .map(|_| ())
            .map_err(|err| PackError::io(dest, err.error))
    }
}
