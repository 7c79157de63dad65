use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use super::{derive_folders, VirtualPath};

/// Errors produced by virtual storage implementations.
///
/// Absence is never an error: lookups return `None` and deletes return `false`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Ciphertext failed authentication: corruption or a different key.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
    /// The key could not be used to encrypt.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },
    /// Reading from the storage directory failed.
    #[error("storage read failed: {reason}")]
    Read { reason: String },
    /// Writing a data file or the index failed (disk full, permission denied).
    #[error("storage write failed: {reason}")]
    Write { reason: String },
    /// The index decrypted but its contents are not a valid index.
    #[error("index is corrupt: {reason}")]
    IndexCorrupt { reason: String },
    /// A payload could not be converted to or from JSON.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
    #[error("invalid virtual path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    /// The key provider could not supply a usable key.
    #[error("key unavailable: {reason}")]
    Key { reason: String },
}

/// Listing view of a stored document. The physical filename is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub virtual_path: VirtualPath,
    pub created_time: DateTime<Utc>,
    /// Size of the stored representation in bytes.
    pub size: u64,
}

/// Contract for encrypted virtual storage used by the entry and notebook managers.
///
/// Implementations are single-writer: every mutation (and `load_file`, which may
/// prune a dangling entry) takes `&mut self`. Share across threads only behind one
/// `Mutex` that owns the whole store.
pub trait VirtualStore: Send {
    /// Persist `data` under `path`, replacing any previous content.
    fn store_file(&mut self, path: &VirtualPath, data: &[u8]) -> Result<(), StorageError>;

    /// Return the plaintext stored under `path`, or `None` if nothing is stored.
    fn load_file(&mut self, path: &VirtualPath) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove `path`. Returns `false` if it was never stored.
    fn delete_file(&mut self, path: &VirtualPath) -> Result<bool, StorageError>;

    /// Every entry whose virtual path starts with the raw string `prefix`.
    /// Pass a trailing `/` (e.g. `notebooks/Work/`) to stay within one folder.
    fn list_files(&self, prefix: &str) -> Vec<FileInfo>;

    fn file_info(&self, path: &VirtualPath) -> Option<FileInfo>;

    /// Folder view derived from the stored paths; see [`derive_folders`].
    fn list_virtual_folders(&self) -> Vec<VirtualPath>;

    /// Store a zero-content marker so an otherwise empty folder stays listed.
    fn create_virtual_folder(&mut self, folder: &VirtualPath) -> Result<(), StorageError> {
        self.store_file(&folder.folder_marker(), &[])
    }

    fn store_json<T: Serialize>(&mut self, path: &VirtualPath, value: &T) -> Result<(), StorageError>
    where
        Self: Sized,
    {
        let bytes = serde_json::to_vec(value).map_err(serialization_err)?;
        self.store_file(path, &bytes)
    }

    fn load_json<T: DeserializeOwned>(
        &mut self,
        path: &VirtualPath,
    ) -> Result<Option<T>, StorageError>
    where
        Self: Sized,
    {
        self.load_file(path)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(serialization_err))
            .transpose()
    }
}

fn serialization_err(err: serde_json::Error) -> StorageError {
    StorageError::Serialization {
        reason: err.to_string(),
    }
}

/// In-memory virtual store for tests and smoke runs.
/// Not cryptographically secure; it only avoids holding plaintext verbatim.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVirtualStore {
    files: BTreeMap<VirtualPath, MaskedFile>,
}

#[derive(Debug, Clone)]
struct MaskedFile {
    bytes: Vec<u8>,
    created_time: DateTime<Utc>,
}

impl InMemoryVirtualStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn info(path: &VirtualPath, file: &MaskedFile) -> FileInfo {
        FileInfo {
            virtual_path: path.clone(),
            created_time: file.created_time,
            size: file.bytes.len() as u64,
        }
    }
}

impl VirtualStore for InMemoryVirtualStore {
    fn store_file(&mut self, path: &VirtualPath, data: &[u8]) -> Result<(), StorageError> {
        self.files.insert(
            path.clone(),
            MaskedFile {
                bytes: mask(data),
                created_time: Utc::now(),
            },
        );
        Ok(())
    }

    fn load_file(&mut self, path: &VirtualPath) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.files.get(path).map(|file| unmask(&file.bytes)))
    }

    fn delete_file(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        Ok(self.files.remove(path).is_some())
    }

    fn list_files(&self, prefix: &str) -> Vec<FileInfo> {
        self.files
            .iter()
            .filter(|(path, _)| path.as_str().starts_with(prefix))
            .map(|(path, file)| Self::info(path, file))
            .collect()
    }

    fn file_info(&self, path: &VirtualPath) -> Option<FileInfo> {
        self.files.get(path).map(|file| Self::info(path, file))
    }

    fn list_virtual_folders(&self) -> Vec<VirtualPath> {
        derive_folders(self.files.keys())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn unmask(input: &[u8]) -> Vec<u8> {
    mask(input) // XOR twice restores original.
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vp(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).expect("valid path")
    }

    #[test]
    fn round_trip_masks_and_unmasks() {
        let mut store = InMemoryVirtualStore::new();
        let path = vp("default/2024-01-01/Note_090000.enc");
        let secret = b"top-secret-payload";

        store.store_file(&path, secret).expect("store should succeed");
        let retrieved = store.load_file(&path).expect("load should succeed");

        assert_eq!(retrieved.as_deref(), Some(&secret[..]));
        assert_ne!(store.files[&path].bytes, secret.to_vec());
    }

    #[test]
    fn delete_reports_absence_without_error() {
        let mut store = InMemoryVirtualStore::new();
        let path = vp("default/k");
        store.store_file(&path, b"v").expect("store should succeed");

        assert!(store.delete_file(&path).expect("delete should succeed"));
        assert!(!store.delete_file(&path).expect("delete again should succeed"));
        assert_eq!(store.load_file(&path).expect("load"), None);
    }

    #[test]
    fn prefix_listing_stays_inside_folder() {
        let mut store = InMemoryVirtualStore::new();
        for raw in [
            "notebooks/A/2024-01-01/x.enc",
            "notebooks/AB/2024-01-01/y.enc",
            "notebooks/B/2024-01-01/z.enc",
            "default/2024-01-01/w.enc",
        ] {
            store.store_file(&vp(raw), b"data").expect("store");
        }

        let listed: Vec<_> = store
            .list_files("notebooks/A/")
            .into_iter()
            .map(|info| info.virtual_path)
            .collect();
        assert_eq!(listed, vec![vp("notebooks/A/2024-01-01/x.enc")]);
    }

    #[test]
    fn json_helpers_separate_decode_failures() {
        let mut store = InMemoryVirtualStore::new();
        let path = vp("default/2024-01-01/Note_090000.enc");
        let value = json!({"title": "A", "content": "hi"});

        store.store_json(&path, &value).expect("store json");
        let loaded: Option<serde_json::Value> = store.load_json(&path).expect("load json");
        assert_eq!(loaded, Some(value));

        store.store_file(&path, b"not json").expect("store raw");
        let err = store
            .load_json::<serde_json::Value>(&path)
            .expect_err("should fail to decode");
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn virtual_folder_survives_without_content() {
        let mut store = InMemoryVirtualStore::new();
        let folder = vp("notebooks/Work");
        store.create_virtual_folder(&folder).expect("create folder");

        assert_eq!(store.list_virtual_folders(), vec![folder.clone()]);
        let marker = store.file_info(&folder.folder_marker()).expect("marker info");
        assert_eq!(marker.size, 0);
    }
}
