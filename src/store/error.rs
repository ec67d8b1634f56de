// Warden — Store error types
//
// Caller-facing policy errors (NotFound, DuplicateName, InvalidTransition,
// Unauthorized) and integrity/storage errors (Decryption, Database) share one
// enum; `kind()` gives transports a fieldless discriminant to map on.

use thiserror::Error;
use uuid::Uuid;

use super::models::RequestStatus;
use crate::enclave::EnclaveError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A secret named '{0}' already exists")]
    DuplicateName(String),

    #[error("Request {id} is already {status}")]
    InvalidTransition { id: Uuid, status: RequestStatus },

    /// Deliberately carries no detail about whether the secret exists.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Secret payload could not be decrypted: corrupted data or wrong master key")]
    Decryption,

    #[error("Cipher error: {0}")]
    Cipher(EnclaveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Discriminant of a `StoreError`, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateName,
    InvalidTransition,
    Unauthorized,
    Decryption,
    Storage,
    Internal,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Decryption => ErrorKind::Decryption,
            Self::Database(_) => ErrorKind::Storage,
            Self::Cipher(_) | Self::Json(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<EnclaveError> for StoreError {
    fn from(e: EnclaveError) -> Self {
        match e {
            EnclaveError::Decryption => Self::Decryption,
            other => Self::Cipher(other),
        }
    }
}
