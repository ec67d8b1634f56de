// Warden — Library root
//
// Approval-gated secret storage: the enclave (keys and cipher), the store
// (secrets, access requests, audit trail), the external vault adapter, and
// the service surface exposed through the CLI and the UDS gateway.

pub mod cli;
pub mod config;
pub mod enclave;
pub mod error;
pub mod gateway;
pub mod service;
pub mod store;
pub mod vault;

pub use error::{Result, WardenError};
