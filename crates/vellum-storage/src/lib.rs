//! Encrypted virtual storage with encryption at rest.
//! Documents live under hashed filenames, sealed with AES-GCM, and are tracked by an
//! encrypted index; keys come from the OS keyring, a key file, or test doubles.

mod fsio;
pub mod codec;
pub mod hasher;
pub mod index;
pub mod key_provider;
pub mod manager;

pub use manager::{IndexRecovery, SecureStorageManager, StorageOptions, StorageStats};
