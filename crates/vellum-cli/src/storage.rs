use std::path::{Path, PathBuf};

use crate::config::{Config, KeySource};
use color_eyre::{eyre::WrapErr, Result};
use dirs::data_dir;
use tracing::debug;
use vellum_storage::{
    key_provider::{FileKeyProvider, KeyProvider, KeyringProvider},
    IndexRecovery, SecureStorageManager, StorageOptions,
};

const DATA_DIR_ENV: &str = "VELLUM_DATA_DIR";
const SECURE_STORAGE_DIR: &str = "secure_storage";
const KEY_FILE: &str = "master.key";
const KEYRING_SERVICE: &str = "vellum";
const KEYRING_ACCOUNT: &str = "data-key";

/// Resolve the default data directory for Vellum.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("vellum"))
}

/// Data directory precedence: `VELLUM_DATA_DIR`, then config, then the platform default.
pub fn resolve_data_dir(config: &Config) -> Result<PathBuf> {
    let from_env = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
    resolve_data_dir_with(config, from_env)
}

fn resolve_data_dir_with(config: &Config, from_env: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = from_env.or_else(|| config.data_dir.clone()) {
        return Ok(dir);
    }
    default_data_dir()
}

/// Key source chosen by config: OS keychain (default) or a standalone key file.
pub fn key_provider(config: &Config, data_dir: &Path) -> Box<dyn KeyProvider> {
    match config.key.source {
        KeySource::Keyring => Box::new(KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT)),
        KeySource::File => {
            let path = config
                .key
                .file
                .clone()
                .unwrap_or_else(|| data_dir.join(KEY_FILE));
            Box::new(FileKeyProvider::new(path))
        }
    }
}

pub fn storage_options(config: &Config, recover_flag: bool) -> StorageOptions {
    let index_recovery = if recover_flag || config.storage.recover_index {
        IndexRecovery::Recover
    } else {
        IndexRecovery::Fail
    };
    StorageOptions { index_recovery }
}

/// Open the encrypted storage described by `config`.
pub async fn open_storage(config: &Config, recover_flag: bool) -> Result<SecureStorageManager> {
    let data_dir = resolve_data_dir(config)?;
    let provider = key_provider(config, &data_dir);
    let root = data_dir.join(SECURE_STORAGE_DIR);
    debug!(?root, "opening encrypted storage");

    SecureStorageManager::open_with_provider(
        root,
        provider.as_ref(),
        storage_options(config, recover_flag),
    )
    .await
    .wrap_err("failed to open encrypted storage")
}

/// Helper for tests to construct storage rooted at a temp dir with a fixed key.
#[cfg(test)]
pub fn test_storage(root: impl Into<PathBuf>) -> SecureStorageManager {
    let key = vellum_storage::key_provider::KeyMaterial::from_slice("test", &[1u8; 32])
        .expect("test key");
    SecureStorageManager::open(root, &key).expect("open test storage")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyConfig, StorageConfig};

    #[test]
    fn env_overrides_config_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/from/config")),
            ..Config::default()
        };
        assert_eq!(
            resolve_data_dir_with(&config, Some(PathBuf::from("/from/env"))).expect("resolve"),
            PathBuf::from("/from/env")
        );
        assert_eq!(
            resolve_data_dir_with(&config, None).expect("resolve"),
            PathBuf::from("/from/config")
        );
    }

    #[test]
    fn recover_flag_or_config_enables_recovery() {
        let mut config = Config::default();
        assert_eq!(storage_options(&config, false).index_recovery, IndexRecovery::Fail);
        assert_eq!(storage_options(&config, true).index_recovery, IndexRecovery::Recover);

        config.storage = StorageConfig {
            recover_index: true,
        };
        assert_eq!(storage_options(&config, false).index_recovery, IndexRecovery::Recover);
    }

    #[tokio::test]
    async fn file_key_source_opens_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            key: KeyConfig {
                source: KeySource::File,
                file: None,
            },
            ..Config::default()
        };

        let provider = key_provider(&config, dir.path());
        let storage = SecureStorageManager::open_with_provider(
            dir.path().join(SECURE_STORAGE_DIR),
            provider.as_ref(),
            storage_options(&config, false),
        )
        .await
        .expect("open");

        assert!(dir.path().join(KEY_FILE).exists());
        assert!(storage.root().ends_with(SECURE_STORAGE_DIR));
    }
}
