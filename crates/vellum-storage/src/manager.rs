use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use vellum_core::storage::{derive_folders, FileInfo, StorageError, VirtualPath, VirtualStore};

use crate::{
    codec::BlobCodec,
    fsio::{read_err, read_optional, remove_if_exists, write_atomic, write_err},
    hasher::secure_filename,
    index::{is_reserved, IndexEntry, IndexStore, StorageIndex},
    key_provider::{KeyMaterial, KeyProvider},
};

/// What to do when the index exists but cannot be read at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexRecovery {
    /// Surface the failure; nothing on disk is touched.
    #[default]
    Fail,
    /// Fall back to the previous index generation. A corrupt index whose key is
    /// proven good (it decrypted) is quarantined and replaced by an empty one;
    /// a decryption failure without a readable backup still fails, since it most
    /// likely means a wrong key.
    Recover,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageOptions {
    pub index_recovery: IndexRecovery,
}

/// Aggregate view of the storage directory.
///
/// `virtual_file_count` comes from the index while the physical figures come from a
/// live directory scan, so a caller can spot drift between the two. The index file and
/// its backup or quarantined generations are not data files: they are excluded from
/// `physical_file_count` and `total_bytes` and reported on their own as `index_bytes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub virtual_file_count: usize,
    /// Data files on disk, orphans included.
    pub physical_file_count: usize,
    /// Bytes held by data files.
    pub total_bytes: u64,
    /// Bytes held by the index and its backup/quarantined generations.
    pub index_bytes: u64,
}

impl StorageStats {
    pub fn total_size_mb(&self) -> f64 {
        (self.total_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

/// Encrypted virtual file system: contents, names, and folder layout are hidden.
///
/// Every document is sealed by a [`BlobCodec`] and written to a flat directory under a
/// hashed name; the encrypted index is the single source of truth for which files
/// are live and is rewritten after every mutation. Single-writer by construction.
pub struct SecureStorageManager {
    root: PathBuf,
    codec: BlobCodec,
    index_store: IndexStore,
    index: StorageIndex,
}

struct DataFile {
    name: String,
    path: PathBuf,
    len: u64,
}

#[derive(Default)]
struct DirScan {
    data_files: Vec<DataFile>,
    index_bytes: u64,
}

impl SecureStorageManager {
    /// Open (or initialize) the storage rooted at `root`, failing on an unreadable index.
    pub fn open(root: impl Into<PathBuf>, key: &KeyMaterial) -> Result<Self, StorageError> {
        Self::open_with(root, key, StorageOptions::default())
    }

    #[instrument(skip_all, fields(recovery = ?options.index_recovery))]
    pub fn open_with(
        root: impl Into<PathBuf>,
        key: &KeyMaterial,
        options: StorageOptions,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(write_err)?;

        let codec = BlobCodec::new(key)?;
        let index_store = IndexStore::new(&root);
        let (index, recovered) = match index_store.load(&codec) {
            Ok(index) => (index, false),
            Err(err) => (
                recover_index(&index_store, &codec, options.index_recovery, err)?,
                true,
            ),
        };

        let manager = Self {
            root,
            codec,
            index_store,
            index,
        };
        if recovered {
            // The current generation was moved aside; write the recovered one in its place.
            manager.persist_index()?;
        }

        info!(entries = manager.index.len(), key_id = %key.id, "secure storage opened");
        Ok(manager)
    }

    /// Open using a key obtained from `provider`.
    pub async fn open_with_provider<P: KeyProvider + ?Sized>(
        root: impl Into<PathBuf>,
        provider: &P,
        options: StorageOptions,
    ) -> Result<Self, StorageError> {
        let key = provider
            .get_or_create()
            .await
            .map_err(|e| StorageError::Key {
                reason: e.to_string(),
            })?;
        Self::open_with(root, &key, options)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete every non-reserved file in the storage root that no index entry points to.
    /// Returns how many were removed. Reconciles crashes between a data write and the
    /// index save.
    #[instrument(skip_all)]
    pub fn cleanup_orphaned_files(&mut self) -> Result<usize, StorageError> {
        let scan = self.scan()?;
        let referenced = self.index.referenced_filenames();

        let mut removed = 0;
        for file in scan.data_files {
            if referenced.contains(file.name.as_str()) {
                continue;
            }
            if remove_if_exists(&file.path)? {
                debug!(file = %file.name, "removed orphaned file");
                removed += 1;
            }
        }

        info!(removed, "orphan cleanup finished");
        Ok(removed)
    }

    #[instrument(skip_all)]
    pub fn get_storage_stats(&self) -> Result<StorageStats, StorageError> {
        let scan = self.scan()?;
        Ok(StorageStats {
            virtual_file_count: self.index.len(),
            physical_file_count: scan.data_files.len(),
            total_bytes: scan.data_files.iter().map(|f| f.len).sum(),
            index_bytes: scan.index_bytes,
        })
    }

    /// Confirm the key still encrypts and decrypts before the caller locks up.
    pub fn verify_key(&self) -> Result<(), StorageError> {
        self.codec.verify()
    }

    fn persist_index(&self) -> Result<(), StorageError> {
        self.index_store.save(&self.index, &self.codec)
    }

    /// Put the in-memory index back to what is on disk after a failed save.
    fn restore_entry(&mut self, path: &VirtualPath, previous: Option<IndexEntry>) {
        match previous {
            Some(entry) => {
                self.index.put(path.clone(), entry);
            }
            None => {
                self.index.remove(path);
            }
        }
    }

    fn scan(&self) -> Result<DirScan, StorageError> {
        let mut scan = DirScan::default();
        for dirent in fs::read_dir(&self.root).map_err(read_err)? {
            let dirent = dirent.map_err(read_err)?;
            let meta = dirent.metadata().map_err(read_err)?;
            if !meta.is_file() {
                continue;
            }

            let name = dirent.file_name().to_string_lossy().into_owned();
            if is_reserved(&name) {
                scan.index_bytes += meta.len();
                continue;
            }
            scan.data_files.push(DataFile {
                name,
                path: dirent.path(),
                len: meta.len(),
            });
        }
        Ok(scan)
    }
}

impl VirtualStore for SecureStorageManager {
    #[instrument(skip_all)]
    fn store_file(&mut self, path: &VirtualPath, data: &[u8]) -> Result<(), StorageError> {
        let blob = self.codec.encrypt(data)?;
        let filename = secure_filename(path);
        write_atomic(&self.root.join(&filename), &blob)?;

        let size = blob.len() as u64;
        let entry = IndexEntry {
            secure_filename: filename,
            created_time: Utc::now(),
            size,
        };
        let previous = self.index.put(path.clone(), entry);
        if let Err(err) = self.persist_index() {
            // The data file stays behind as an orphan for cleanup_orphaned_files.
            self.restore_entry(path, previous);
            return Err(err);
        }

        debug!(size, replaced = previous.is_some(), "stored blob");
        Ok(())
    }

    #[instrument(skip_all)]
    fn load_file(&mut self, path: &VirtualPath) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(entry) = self.index.get(path) else {
            return Ok(None);
        };

        let Some(blob) = read_optional(&self.root.join(&entry.secure_filename))? else {
            warn!(file = %entry.secure_filename, "indexed file missing on disk, pruning entry");
            let pruned = self.index.remove(path);
            if let Err(err) = self.persist_index() {
                self.restore_entry(path, pruned);
                return Err(err);
            }
            return Ok(None);
        };

        self.codec.decrypt(&blob).map(Some)
    }

    #[instrument(skip_all)]
    fn delete_file(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        let Some(entry) = self.index.remove(path) else {
            return Ok(false);
        };

        if let Err(err) = remove_if_exists(&self.root.join(&entry.secure_filename)) {
            self.index.put(path.clone(), entry);
            return Err(err);
        }
        if let Err(err) = self.persist_index() {
            // The entry now dangles; load_file will prune it.
            self.index.put(path.clone(), entry);
            return Err(err);
        }

        debug!(file = %entry.secure_filename, "deleted blob");
        Ok(true)
    }

    #[instrument(skip_all)]
    fn list_files(&self, prefix: &str) -> Vec<FileInfo> {
        self.index
            .entries_with_prefix(prefix)
            .map(|(path, entry)| entry.to_info(path))
            .collect()
    }

    #[instrument(skip_all)]
    fn file_info(&self, path: &VirtualPath) -> Option<FileInfo> {
        self.index.get(path).map(|entry| entry.to_info(path))
    }

    #[instrument(skip_all)]
    fn list_virtual_folders(&self) -> Vec<VirtualPath> {
        derive_folders(self.index.paths())
    }
}

fn recover_index(
    store: &IndexStore,
    codec: &BlobCodec,
    policy: IndexRecovery,
    err: StorageError,
) -> Result<StorageIndex, StorageError> {
    if policy == IndexRecovery::Fail {
        return Err(err);
    }
    // Only a parse failure proves the key decrypts this index.
    let key_proven = match err {
        StorageError::IndexCorrupt { .. } => true,
        StorageError::Decryption { .. } => false,
        _ => return Err(err),
    };

    match store.load_backup(codec) {
        Ok(Some(index)) => {
            warn!(error = %err, entries = index.len(), "index unreadable, restoring previous generation");
            store.quarantine()?;
            Ok(index)
        }
        Ok(None) | Err(_) if key_proven => {
            warn!(error = %err, "index corrupt and no usable backup, starting empty");
            store.quarantine()?;
            Ok(StorageIndex::default())
        }
        _ => Err(err),
    }
}
