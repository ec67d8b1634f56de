// Warden — Vault error types
//
// These never cross the `VaultFallback::lookup` boundary; they are logged and
// collapsed into "not found" there. Only client construction surfaces them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid vault URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault responded with status {0}")]
    Status(reqwest::StatusCode),
}
