// Warden — Cipher Boundary
//
// Authenticated symmetric encryption of secret payloads with AES-256-GCM.
// Sealed layout: 12-byte random nonce || ciphertext || 16-byte tag.
//
// The key is supplied once at construction by whoever owns it (the CLI or the
// gateway, after deriving it in the enclave) and is never read from global
// state. A failed tag check is always reported as `EnclaveError::Decryption`;
// this type never hands back unauthenticated bytes.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::Zeroizing;

use super::EnclaveError;

/// Cipher key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Stateless encrypt/decrypt of secret payloads under a single key.
#[derive(Clone)]
pub struct Cipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl Cipher {
    /// Build a cipher from raw key bytes. Fails only on a malformed key length.
    pub fn new(key: &[u8]) -> Result<Self, EnclaveError> {
        if key.len() != KEY_LEN {
            return Err(EnclaveError::MalformedKey {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }

        let mut owned = Zeroizing::new([0u8; KEY_LEN]);
        owned.copy_from_slice(key);
        Ok(Self { key: owned })
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead()
            .encrypt(&nonce, plaintext)
            .map_err(|e| EnclaveError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a payload produced by `encrypt`.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(EnclaveError::Decryption);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .aead()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EnclaveError::Decryption)?;

        Ok(Zeroizing::new(plaintext))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").field("key", &"[REDACTED]").finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
