// Warden — Vault Fallback Module
//
// Optional read-through to an external secret store, consulted only when a
// secret is missing locally. Lookups fail closed: any transport error,
// timeout, or non-success response is reported as "not found".

mod client;
mod error;

pub use client::{HttpVaultFallback, VaultFallback, VaultRecord};
pub use error::VaultError;
