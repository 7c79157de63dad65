use std::{
    fmt, fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the symmetric key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Build key material from raw bytes, rejecting anything that is not exactly 32 bytes.
    pub fn from_slice(id: impl Into<String>, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::Decode(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(bytes);
        Ok(Self {
            id: id.into(),
            bytes: out,
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("key file error: {0}")]
    File(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to encryption keys (OS keychain or key file in production; memory in tests).
/// The storage layer never persists the key itself.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        match keyring::Entry::new(&self.service, &self.account) {
            Ok(entry) => {
                if let Ok(secret) = entry.get_password() {
                    return decode_key(&secret);
                }

                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                info!(service = %self.service, "generated new data key in keyring");
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// Key stored base64-encoded in a standalone file (the journal's `master.key`).
/// Created on first use; owner-only permissions on Unix.
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        match fs::read_to_string(&self.path) {
            Ok(secret) => decode_key(secret.trim()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let material = generate_key();
                write_key_file(&self.path, &encode_key(&material))?;
                info!(path = ?self.path, "generated new key file");
                Ok(material)
            }
            Err(err) => Err(KeyError::File(err.to_string())),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    let material = KeyMaterial {
        id: "default".to_string(),
        bytes,
    };
    bytes.zeroize();
    material
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let mut bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    let material = KeyMaterial::from_slice("default", &bytes);
    bytes.zeroize();
    material
}

fn write_key_file(path: &Path, encoded: &str) -> Result<(), KeyError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| KeyError::File(e.to_string()))?;

    // NamedTempFile is created 0600 on Unix and the mode survives the rename.
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| KeyError::File(e.to_string()))?;
    tmp.write_all(encoded.as_bytes())
        .map_err(|e| KeyError::File(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| KeyError::File(e.to_string()))?;
    tmp.persist_noclobber(path)
        .map_err(|e| KeyError::File(e.error.to_string()))?;
    Ok(())
}
