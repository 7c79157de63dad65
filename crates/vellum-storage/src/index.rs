use std::{
    collections::{BTreeMap, HashSet},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vellum_core::storage::{FileInfo, StorageError, VirtualPath};

use crate::{
    codec::BlobCodec,
    fsio::{read_optional, write_atomic, write_err},
};

/// Well-known name of the encrypted index inside the storage root.
pub const INDEX_FILE: &str = "index.enc";

const BACKUP_SUFFIX: &str = ".bak";
const QUARANTINE_SUFFIX: &str = ".corrupt-";

/// Physical storage metadata for one virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub secure_filename: String,
    pub created_time: DateTime<Utc>,
    /// Ciphertext length in bytes.
    pub size: u64,
}

impl IndexEntry {
    pub fn to_info(&self, path: &VirtualPath) -> FileInfo {
        FileInfo {
            virtual_path: path.clone(),
            created_time: self.created_time,
            size: self.size,
        }
    }
}

/// The authoritative mapping from virtual path to physical file.
/// Serialized as a JSON object keyed by virtual path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageIndex {
    entries: BTreeMap<VirtualPath, IndexEntry>,
}

impl StorageIndex {
    pub fn get(&self, path: &VirtualPath) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Insert or replace; returns the replaced entry.
    pub fn put(&mut self, path: VirtualPath, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(path, entry)
    }

    pub fn remove(&mut self, path: &VirtualPath) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    /// Entries whose virtual path starts with the raw string `prefix`.
    pub fn entries_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a VirtualPath, &'a IndexEntry)> + 'a {
        self.entries
            .iter()
            .filter(move |(path, _)| path.as_str().starts_with(prefix))
    }

    pub fn paths(&self) -> impl Iterator<Item = &VirtualPath> {
        self.entries.keys()
    }

    pub fn referenced_filenames(&self) -> HashSet<&str> {
        self.entries
            .values()
            .map(|entry| entry.secure_filename.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a file in the storage root belongs to the index (current, backup, or
/// quarantined generation). Such files are never orphans or data files.
pub fn is_reserved(file_name: &str) -> bool {
    file_name.starts_with(INDEX_FILE)
}

/// Persistence of the index file and its previous generation.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(format!("{INDEX_FILE}{BACKUP_SUFFIX}"))
    }

    /// Load the current index. A missing file is a first run and yields an empty index.
    pub fn load(&self, codec: &BlobCodec) -> Result<StorageIndex, StorageError> {
        Ok(read_index(&self.path(), codec)?.unwrap_or_default())
    }

    /// Load the generation saved before the current one, if any.
    pub fn load_backup(&self, codec: &BlobCodec) -> Result<Option<StorageIndex>, StorageError> {
        read_index(&self.backup_path(), codec)
    }

    /// Encrypt and atomically replace the index, keeping the previous generation as backup.
    pub fn save(&self, index: &StorageIndex, codec: &BlobCodec) -> Result<(), StorageError> {
        let json = serde_json::to_vec(index).map_err(|e| StorageError::Serialization {
            reason: format!("index encode failed: {e}"),
        })?;
        let blob = codec.encrypt(&json)?;

        let current = self.path();
        match fs::copy(&current, self.backup_path()) {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(write_err(format!("index backup failed: {err}"))),
        }

        write_atomic(&current, &blob)?;
        debug!(entries = index.len(), bytes = blob.len(), "index saved");
        Ok(())
    }

    /// Move an unreadable index aside so it is kept for manual recovery.
    pub fn quarantine(&self) -> Result<PathBuf, StorageError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self.dir.join(format!("{INDEX_FILE}{QUARANTINE_SUFFIX}{stamp}"));
        fs::rename(self.path(), &target).map_err(write_err)?;
        warn!(file = ?target.file_name(), "quarantined unreadable index");
        Ok(target)
    }
}

fn read_index(path: &Path, codec: &BlobCodec) -> Result<Option<StorageIndex>, StorageError> {
    let Some(blob) = read_optional(path)? else {
        return Ok(None);
    };
    let json = codec.decrypt(&blob).map_err(|err| match err {
        StorageError::Decryption { reason } => StorageError::Decryption {
            reason: format!("index: {reason}"),
        },
        other => other,
    })?;
    serde_json::from_slice(&json)
        .map(Some)
        .map_err(|e| StorageError::IndexCorrupt {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::KeyMaterial;

    fn codec() -> BlobCodec {
        let key = KeyMaterial::from_slice("test", &[3u8; 32]).expect("key");
        BlobCodec::new(&key).expect("codec")
    }

    fn vp(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).expect("valid path")
    }

    fn entry(name: &str) -> IndexEntry {
        IndexEntry {
            secure_filename: name.to_string(),
            created_time: Utc::now(),
            size: 42,
        }
    }

    #[test]
    fn put_replaces_in_place() {
        let mut index = StorageIndex::default();
        assert!(index.put(vp("default/a"), entry("a.dat")).is_none());
        let previous = index.put(vp("default/a"), entry("a.dat")).expect("replaced");
        assert_eq!(previous.secure_filename, "a.dat");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn prefix_filter_is_a_raw_string_match() {
        let mut index = StorageIndex::default();
        index.put(vp("notebooks/A/x"), entry("1.dat"));
        index.put(vp("notebooks/AB/y"), entry("2.dat"));
        index.put(vp("default/z"), entry("3.dat"));

        let under_a: Vec<_> = index
            .entries_with_prefix("notebooks/A/")
            .map(|(path, _)| path.as_str())
            .collect();
        assert_eq!(under_a, vec!["notebooks/A/x"]);
        assert_eq!(index.entries_with_prefix("notebooks/A").count(), 2);
    }

    #[test]
    fn serializes_as_object_keyed_by_path() {
        let mut index = StorageIndex::default();
        index.put(vp("default/a"), entry("a.dat"));
        let json = serde_json::to_value(&index).expect("serialize");
        assert_eq!(json["default/a"]["secure_filename"], "a.dat");
        assert_eq!(json["default/a"]["size"], 42);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IndexStore::new(dir.path());
        assert!(store.load(&codec()).expect("load").is_empty());
        assert_eq!(store.load_backup(&codec()).expect("backup"), None);
    }

    #[test]
    fn save_keeps_previous_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IndexStore::new(dir.path());
        let codec = codec();

        let mut index = StorageIndex::default();
        index.put(vp("default/a"), entry("a.dat"));
        store.save(&index, &codec).expect("first save");
        assert!(!store.backup_path().exists());

        index.put(vp("default/b"), entry("b.dat"));
        store.save(&index, &codec).expect("second save");

        assert_eq!(store.load(&codec).expect("load").len(), 2);
        assert_eq!(store.load_backup(&codec).expect("backup").map(|i| i.len()), Some(1));
        let raw = fs::read(store.path()).expect("read");
        assert!(!String::from_utf8_lossy(&raw).contains("default/a"));
    }

    #[test]
    fn decrypt_and_parse_failures_are_distinct() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IndexStore::new(dir.path());
        let codec = codec();

        fs::write(store.path(), codec.encrypt(b"not json").expect("encrypt")).expect("write");
        let err = store.load(&codec).expect_err("parse failure");
        assert!(matches!(err, StorageError::IndexCorrupt { .. }));

        fs::write(store.path(), b"garbage that is not a blob").expect("write");
        let err = store.load(&codec).expect_err("decrypt failure");
        assert!(matches!(err, StorageError::Decryption { .. }));
    }

    #[test]
    fn quarantine_moves_index_aside() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IndexStore::new(dir.path());
        fs::write(store.path(), b"broken").expect("write");

        let moved = store.quarantine().expect("quarantine");
        assert!(!store.path().exists());
        assert!(moved.exists());
        let name = moved.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(is_reserved(name));
    }
}
