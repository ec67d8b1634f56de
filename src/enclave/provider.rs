// Warden — Master Key Provider
//
// Owns the master secret from which the cipher key is derived. The master
// secret sits in the platform keyring; the derived key only ever lives in
// zeroizing buffers and is passed to `Cipher::new` by the caller.
//
// Flow:
//   1. `get_or_create_master_secret()`: read from keyring, or generate + store on first run
//   2. `derive_cipher_key()`: Argon2id(master secret, salt) -> 32-byte AES-256 key
//   3. `open_cipher()`: both of the above for an already-initialized installation

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::cipher::{Cipher, KEY_LEN};
use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Keyring service name for Warden entries.
const KEYRING_SERVICE: &str = "warden-secret-vault";

/// Keyring user identifying the master secret.
const KEYRING_USER: &str = "master-secret";

/// Master secret length in bytes (256-bit entropy).
const MASTER_SECRET_LEN: usize = 32;

// Argon2id: m=65536 (64 MiB), t=3, p=4
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over master key storage so tests can run without a keyring.
pub trait MasterKeyProvider {
    /// Retrieve the master secret, generating and storing one on first use.
    fn get_or_create_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Salt mixed into the Argon2id derivation.
    fn salt(&self) -> Vec<u8>;

    /// Whether a master secret exists yet.
    fn has_master_secret(&self) -> Result<bool, EnclaveError>;

    /// Derive the AES-256 cipher key from the master secret using Argon2id.
    fn derive_cipher_key(&self, master_secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        derive_key(master_secret, &self.salt())
    }

    /// Build the cipher for an initialized installation.
    /// Fails with `MasterSecretNotFound` instead of silently creating a new key,
    /// which would orphan every existing ciphertext.
    fn open_cipher(&self) -> Result<Cipher, EnclaveError> {
        if !self.has_master_secret()? {
            return Err(EnclaveError::MasterSecretNotFound);
        }
        let master = self.get_or_create_master_secret()?;
        let key = self.derive_cipher_key(&master)?;
        Cipher::new(&key)
    }
}

/// Salt = SHA-256(service || "::" || user), stable per installation.
fn build_salt(service: &str, user: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update(b"::");
    hasher.update(user.as_bytes());
    hasher.finalize().to_vec()
}

fn derive_key(master_secret: &[u8], salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|e| EnclaveError::Derivation(format!("invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut derived = Zeroizing::new(vec![0u8; KEY_LEN]);
    argon2
        .hash_password_into(master_secret, salt, &mut derived)
        .map_err(|e| EnclaveError::Derivation(format!("Argon2id hash failed: {}", e)))?;

    Ok(derived)
}

fn generate_master_secret() -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
    let mut secret = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
    rand::rng().fill_bytes(&mut secret);

    if secret.len() != MASTER_SECRET_LEN {
        return Err(EnclaveError::InsufficientEntropy(
            secret.len(),
            MASTER_SECRET_LEN,
        ));
    }

    Ok(secret)
}

// ─── Platform Implementation ─────────────────────────────────────────────────

/// Production provider backed by the `keyring` crate
/// (Secret Service on Linux, Keychain on macOS, Credential Manager on Windows).
pub struct KeyringProvider {
    service: String,
    user: String,
}

impl KeyringProvider {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| EnclaveError::Keyring(format!("failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterKeyProvider for KeyringProvider {
    fn get_or_create_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let entry = self.entry()?;

        match entry.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved master secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!("No master secret found, generating new one");
                let secret = generate_master_secret()?;
                entry.set_secret(&secret).map_err(|e| {
                    EnclaveError::Keyring(format!("failed to store master secret: {}", e))
                })?;
                tracing::info!("Master secret stored in platform keyring");
                Ok(secret)
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    fn salt(&self) -> Vec<u8> {
        build_salt(&self.service, &self.user)
    }

    fn has_master_secret(&self) -> Result<bool, EnclaveError> {
        match self.entry()?.get_secret() {
            Ok(secret) => {
                drop(Zeroizing::new(secret));
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to check master secret: {}",
                e
            ))),
        }
    }
}

// ─── In-Memory Mock for Testing ──────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────────────────
