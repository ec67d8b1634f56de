// Warden — Enclave error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Master secret not found: run `warden init` first")]
    MasterSecretNotFound,

    #[error("Entropy error: generated secret has insufficient entropy ({0} bytes, expected {1})")]
    InsufficientEntropy(usize, usize),

    #[error("Malformed cipher key: expected {expected} bytes, got {actual}")]
    MalformedKey { expected: usize, actual: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, truncated payload, or a failed authentication tag.
    #[error("Decryption failed: ciphertext is corrupted or was sealed under a different key")]
    Decryption,
}
