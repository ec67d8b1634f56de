// Warden — Enclave Module
//
// Key material and the cipher boundary. The master secret lives in the OS
// keyring; the cipher key is derived from it with Argon2id and handed to
// `Cipher` explicitly. Nothing in this module touches persisted data.

mod cipher;
mod error;
mod provider;

pub use cipher::{Cipher, KEY_LEN, NONCE_LEN};
pub use error::EnclaveError;
pub use provider::{KeyringProvider, MasterKeyProvider};

