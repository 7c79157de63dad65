use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use vellum_core::storage::StorageError;

use crate::key_provider::KeyMaterial;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

const PROBE: &[u8] = b"vellum-key-probe";

/// AES-256-GCM codec for every blob the storage layer writes, the index included.
///
/// Layout: `version (1) || nonce (12) || ciphertext || tag (16)`; the nonce is fresh
/// per blob. Every way a blob can be unreadable maps to [`StorageError::Decryption`].
pub struct BlobCodec {
    cipher: Aes256Gcm,
}

impl BlobCodec {
    pub fn new(key: &KeyMaterial) -> Result<Self, StorageError> {
        let cipher =
            Aes256Gcm::new_from_slice(&key.bytes).map_err(|e| StorageError::Encryption {
                reason: format!("cipher init failed: {e}"),
            })?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext)
                .map_err(|e| StorageError::Encryption {
                    reason: format!("encrypt failed: {e}"),
                })?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.push(FORMAT_VERSION);
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, StorageError> {
        if blob.len() < HEADER_LEN + TAG_LEN {
            return Err(decryption_err(format!(
                "blob too short ({} bytes)",
                blob.len()
            )));
        }

        let (version, rest) = blob.split_at(1);
        if version[0] != FORMAT_VERSION {
            return Err(decryption_err(format!(
                "unknown blob version {}",
                version[0]
            )));
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| decryption_err("authentication failed (corrupt data or wrong key)".into()))
    }

    /// Encrypt and decrypt a probe value to confirm the key is usable.
    pub fn verify(&self) -> Result<(), StorageError> {
        let round_trip = self.decrypt(&self.encrypt(PROBE)?)?;
        if round_trip != PROBE {
            return Err(decryption_err("probe round-trip mismatch".into()));
        }
        Ok(())
    }
}

fn decryption_err(reason: String) -> StorageError {
    StorageError::Decryption { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(fill: u8) -> BlobCodec {
        let key = KeyMaterial::from_slice("test", &[fill; 32]).expect("key");
        BlobCodec::new(&key).expect("codec")
    }

    #[test]
    fn round_trip_with_fresh_nonces() {
        let codec = codec(1);
        let first = codec.encrypt(b"hello-vellum").expect("encrypt");
        let second = codec.encrypt(b"hello-vellum").expect("encrypt");

        assert_ne!(first, second, "nonce must differ per blob");
        assert_eq!(first.len(), HEADER_LEN + b"hello-vellum".len() + TAG_LEN);
        assert_eq!(codec.decrypt(&first).expect("decrypt"), b"hello-vellum");
    }

    #[test]
    fn empty_plaintext_is_supported() {
        let codec = codec(1);
        let blob = codec.encrypt(&[]).expect("encrypt");
        assert!(codec.decrypt(&blob).expect("decrypt").is_empty());
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let codec = codec(1);
        let blob = codec.encrypt(b"sensitive").expect("encrypt");

        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            let err = codec.decrypt(&tampered).expect_err("tampering must be detected");
            assert!(matches!(err, StorageError::Decryption { .. }), "byte {i}");
        }
    }

    #[test]
    fn wrong_key_and_truncation_are_decryption_errors() {
        let blob = codec(1).encrypt(b"sensitive").expect("encrypt");

        let err = codec(2).decrypt(&blob).expect_err("wrong key");
        assert!(matches!(err, StorageError::Decryption { .. }));

        let err = codec(1).decrypt(&blob[..HEADER_LEN + 3]).expect_err("truncated");
        assert!(matches!(err, StorageError::Decryption { .. }));
    }

    #[test]
    fn verify_probe_succeeds() {
        codec(9).verify().expect("verify");
    }
}
