// Warden — Store Module
//
// Secret storage, the access-request ledger, the authorization gate, and the
// audit trail, all on one SQLite database. Secret payloads are sealed by the
// enclave cipher before they reach disk.

mod audit;
mod db;
mod error;
mod gate;
mod ledger;
mod models;
mod secrets;

pub use audit::{AuditTrail, SqliteAuditTrail};
pub use db::Database;
pub use error::{ErrorKind, StoreError};
pub use gate::{AuthorizationGate, Verdict};
pub use ledger::{RequestLedger, SqliteRequestLedger};
pub use models::{
    AccessRequest, AuditAction, AuditEntry, AuditOutcome, Identity, NewAuditEntry, NewSecret,
    RequestFilter, RequestId, RequestStatus, RequesterStats, Role, Secret, SecretId, SecretKind,
    SecretMetadata, SecretOrigin,
};
pub use secrets::{SecretRepository, SqliteSecretRepository};
