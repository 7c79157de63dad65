//! Virtual storage contract shared by the encrypted manager and its callers.

mod path;
mod virtual_store;

pub use path::{derive_folders, VirtualPath, FOLDER_MARKER};
pub use virtual_store::{FileInfo, InMemoryVirtualStore, StorageError, VirtualStore};
