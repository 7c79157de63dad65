use sha2::{Digest, Sha256};
use vellum_core::storage::VirtualPath;

/// Hex digits of the digest kept in the on-disk name (64 bits).
const NAME_HEX_LEN: usize = 16;

pub const DATA_EXTENSION: &str = "dat";

/// On-disk name for a virtual path: truncated SHA-256 of its UTF-8 bytes plus `.dat`.
///
/// Deterministic, so re-storing a path overwrites the same physical file.
pub fn secure_filename(path: &VirtualPath) -> String {
    let digest = Sha256::digest(path.as_str().as_bytes());
    let mut name = hex::encode(digest);
    name.truncate(NAME_HEX_LEN);
    format!("{name}.{DATA_EXTENSION}")
}
