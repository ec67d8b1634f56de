// Warden — Secret Repository
//
// Stores secret metadata and sealed payloads keyed by unique name.
// `get_metadata()` never opens the payload; `get_value()` asks the
// authorization gate first and only then loads and opens the ciphertext.
// Every `get_value()` call writes exactly one `read_attempt` audit entry, and
// plaintext is returned only after that entry has been written.

use chrono::{SubsecRound, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::audit;
use super::db::{self, Database};
use super::gate::AuthorizationGate;
use super::models::{
    AuditAction, AuditOutcome, Identity, NewAuditEntry, NewSecret, Secret, SecretId, SecretKind,
    SecretMetadata, SecretOrigin,
};
use super::StoreError;
use crate::enclave::Cipher;
use crate::vault::VaultFallback;

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait SecretRepository {
    /// Seal and store a new secret. `DuplicateName` if the name is taken.
    fn create(&self, secret: NewSecret, creator: &Identity) -> Result<SecretId, StoreError>;

    /// Metadata only. Falls back to the external vault on a local miss.
    fn get_metadata(&self, name: &str) -> Result<SecretMetadata, StoreError>;

    /// Plaintext for an authorized identity. Always audited.
    fn get_value(&self, name: &str, identity: &Identity) -> Result<Zeroizing<String>, StoreError>;

    /// Metadata of every local secret, newest first.
    fn list(&self) -> Result<Vec<SecretMetadata>, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

pub struct SqliteSecretRepository<'a> {
    db: &'a Database,
    cipher: &'a Cipher,
    gate: AuthorizationGate<'a>,
    fallback: Option<&'a dyn VaultFallback>,
}

impl<'a> SqliteSecretRepository<'a> {
    pub fn new(db: &'a Database, cipher: &'a Cipher, gate: AuthorizationGate<'a>) -> Self {
        Self {
            db,
            cipher,
            gate,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a dyn VaultFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn row_to_secret(row: &rusqlite::Row<'_>) -> rusqlite::Result<Secret> {
        let id: String = row.get(0)?;
        let kind: String = row.get(3)?;
        let created_at: String = row.get(5)?;

        Ok(Secret::new(
            db::parse_uuid(0, &id)?,
            row.get(1)?,
            row.get(2)?,
            db::parse_column(3, &kind)?,
            row.get(4)?,
            db::parse_timestamp(5, &created_at)?,
        ))
    }

    fn load(&self, name: &str) -> Result<Option<Secret>, StoreError> {
        let secret = self
            .db
            .conn()
            .query_row(
                "SELECT id, name, description, kind, ciphertext, created_at
                 FROM secrets WHERE name = ?1",
                params![name],
                Self::row_to_secret,
            )
            .optional()?;
        Ok(secret)
    }

    fn open(&self, secret: &Secret) -> Result<Zeroizing<String>, StoreError> {
        let bytes = self.cipher.decrypt(secret.ciphertext())?;
        // Non-UTF-8 output means the payload is not what we sealed.
        let text = std::str::from_utf8(&bytes).map_err(|_| StoreError::Decryption)?;
        Ok(Zeroizing::new(text.to_string()))
    }

    fn audit_read(
        &self,
        identity: &Identity,
        name: &str,
        outcome: AuditOutcome,
        details: impl Into<String>,
    ) -> Result<(), StoreError> {
        audit::append(
            self.db.conn(),
            &NewAuditEntry::new(&identity.name, AuditAction::ReadAttempt, name, outcome)
                .with_details(details),
        )?;
        Ok(())
    }

    /// Audit a failed read, then return its error. A failing audit write wins.
    fn fail_read(
        &self,
        identity: &Identity,
        name: &str,
        outcome: AuditOutcome,
        details: impl Into<String>,
        err: StoreError,
    ) -> Result<Zeroizing<String>, StoreError> {
        self.audit_read(identity, name, outcome, details)?;
        Err(err)
    }
}

impl<'a> SecretRepository for SqliteSecretRepository<'a> {
    fn create(&self, secret: NewSecret, creator: &Identity) -> Result<SecretId, StoreError> {
        let NewSecret {
            name,
            description,
            kind,
            plaintext,
        } = secret;

        let sealed = self.cipher.encrypt(plaintext.as_bytes())?;
        drop(plaintext);

        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(6);

        let tx = self.db.write_tx()?;
        let inserted = tx.execute(
            "INSERT INTO secrets (id, name, description, kind, ciphertext, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO NOTHING",
            params![
                id.to_string(),
                name,
                description,
                kind.as_str(),
                sealed,
                db::timestamp(now),
            ],
        )?;

        if inserted == 0 {
            audit::append(
                &tx,
                &NewAuditEntry::new(
                    &creator.name,
                    AuditAction::CreateSecret,
                    &name,
                    AuditOutcome::Error,
                )
                .with_details("duplicate name"),
            )?;
            tx.commit()?;
            tracing::debug!(secret = %name, "Secret name already taken");
            return Err(StoreError::DuplicateName(name));
        }

        audit::append(
            &tx,
            &NewAuditEntry::new(
                &creator.name,
                AuditAction::CreateSecret,
                &name,
                AuditOutcome::Success,
            )
            .with_details(format!("kind={}", kind.as_str())),
        )?;
        tx.commit()?;

        tracing::info!(
            secret_id = %id,
            secret = %name,
            kind = kind.as_str(),
            creator = %creator,
            "Secret stored successfully"
        );

        Ok(id)
    }

    fn get_metadata(&self, name: &str) -> Result<SecretMetadata, StoreError> {
        if let Some(secret) = self.load(name)? {
            return Ok(secret.metadata());
        }

        match self.fallback.and_then(|f| f.lookup(name)) {
            Some(record) => Ok(SecretMetadata {
                id: None,
                name: record.name.clone(),
                description: record.description.clone().unwrap_or_default(),
                kind: SecretKind::Other,
                origin: SecretOrigin::Vault,
                created_at: None,
            }),
            None => Err(StoreError::NotFound(format!("secret '{}'", name))),
        }
    }

    fn get_value(&self, name: &str, identity: &Identity) -> Result<Zeroizing<String>, StoreError> {
        let verdict = match self.gate.evaluate(identity, name) {
            Ok(v) => v,
            Err(e) => {
                return self.fail_read(identity, name, AuditOutcome::Error, "authorization check failed", e)
            }
        };

        if !verdict.is_granted() {
            tracing::info!(secret = %name, identity = %identity, reason = %verdict.reason(), "Read denied");
            return self.fail_read(
                identity,
                name,
                AuditOutcome::Denied,
                verdict.reason(),
                StoreError::Unauthorized,
            );
        }

        let stored = match self.load(name) {
            Ok(s) => s,
            Err(e) => return self.fail_read(identity, name, AuditOutcome::Error, "storage error", e),
        };

        let (plaintext, source) = match stored {
            Some(secret) => match self.open(&secret) {
                Ok(p) => (p, "local"),
                Err(e) => {
                    tracing::error!(
                        secret = %name,
                        error = %e,
                        "Stored secret failed to decrypt, corrupted row or wrong master key"
                    );
                    return self.fail_read(identity, name, AuditOutcome::Error, "decryption failed", e);
                }
            },
            None => match self.fallback.and_then(|f| f.lookup(name)) {
                Some(record) => (record.into_value(), "vault"),
                None => {
                    return self.fail_read(
                        identity,
                        name,
                        AuditOutcome::Error,
                        "secret not found",
                        StoreError::NotFound(format!("secret '{}'", name)),
                    )
                }
            },
        };

        self.audit_read(
            identity,
            name,
            AuditOutcome::Success,
            format!("{}; source={}", verdict.reason(), source),
        )?;

        tracing::info!(secret = %name, identity = %identity, source, "Secret released");
        Ok(plaintext)
    }

    fn list(&self) -> Result<Vec<SecretMetadata>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, description, kind, ciphertext, created_at
             FROM secrets ORDER BY created_at DESC, rowid DESC",
        )?;

        let rows = stmt.query_map([], Self::row_to_secret)?;

        let mut secrets = Vec::new();
        for row in rows {
            secrets.push(row?.metadata());
        }
        Ok(secrets)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
