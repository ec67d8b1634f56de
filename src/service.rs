// Warden — Access Service
//
// The operation surface shared by the CLI and the UDS gateway. Each call
// builds the components it needs over borrowed handles (database, cipher,
// settings, optional vault) and returns a fully materialized value. Bare
// identity names are turned into `Identity` values here, using the admin
// list from `Settings`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::enclave::Cipher;
use crate::store::{
    AccessRequest, AuditEntry, AuditTrail, AuthorizationGate, Database, NewSecret, RequestFilter,
    RequestId, RequestLedger, RequesterStats, SecretId, SecretMetadata, SecretRepository,
    SqliteAuditTrail, SqliteRequestLedger, SqliteSecretRepository, StoreError,
};
use crate::vault::VaultFallback;

/// Default page size for audit listings.
pub const DEFAULT_AUDIT_LIMIT: usize = 50;

// ─── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedSecret {
    pub id: SecretId,
    pub name: String,
}

/// Released plaintext. Serializes the value; never prints it through `Debug`.
#[derive(Serialize)]
pub struct SecretValue {
    pub name: String,
    #[serde(serialize_with = "expose")]
    pub value: Zeroizing<String>,
}

fn expose<S: Serializer>(value: &Zeroizing<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_str())
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequestInput {
    pub secret_name: String,
    pub requester: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Cursor: only entries strictly older than this.
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource: Option<String>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct AccessService<'a> {
    db: &'a Database,
    cipher: &'a Cipher,
    settings: &'a Settings,
    fallback: Option<&'a dyn VaultFallback>,
}

impl<'a> AccessService<'a> {
    pub fn new(db: &'a Database, cipher: &'a Cipher, settings: &'a Settings) -> Self {
        Self {
            db,
            cipher,
            settings,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Option<&'a dyn VaultFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    fn ledger(&self) -> SqliteRequestLedger<'a> {
        SqliteRequestLedger::new(self.db)
    }

    fn repository<'s>(&'s self, ledger: &'s dyn RequestLedger) -> SqliteSecretRepository<'s> {
        let gate = AuthorizationGate::new(ledger, self.settings.grant_ttl);
        let repo = SqliteSecretRepository::new(self.db, self.cipher, gate);
        match self.fallback {
            Some(fallback) => repo.with_fallback(fallback),
            None => repo,
        }
    }

    pub fn create_secret(&self, creator: &str, secret: NewSecret) -> Result<CreatedSecret, StoreError> {
        let ledger = self.ledger();
        let name = secret.name.clone();
        let id = self
            .repository(&ledger)
            .create(secret, &self.settings.resolve_identity(creator))?;
        Ok(CreatedSecret { id, name })
    }

    pub fn get_secret_metadata(&self, name: &str) -> Result<SecretMetadata, StoreError> {
        let ledger = self.ledger();
        self.repository(&ledger).get_metadata(name)
    }

    pub fn get_secret_value(&self, name: &str, identity: &str) -> Result<SecretValue, StoreError> {
        let ledger = self.ledger();
        let value = self
            .repository(&ledger)
            .get_value(name, &self.settings.resolve_identity(identity))?;
        Ok(SecretValue {
            name: name.to_string(),
            value,
        })
    }

    pub fn list_secrets(&self) -> Result<Vec<SecretMetadata>, StoreError> {
        let ledger = self.ledger();
        self.repository(&ledger).list()
    }

    pub fn create_request(&self, input: &CreateRequestInput) -> Result<AccessRequest, StoreError> {
        self.ledger().create(
            &input.secret_name,
            &self.settings.resolve_identity(&input.requester),
            &input.justification,
        )
    }

    pub fn approve_request(&self, id: &RequestId, decider: &str) -> Result<AccessRequest, StoreError> {
        self.ledger()
            .approve(id, &self.settings.resolve_identity(decider))
    }

    pub fn reject_request(&self, id: &RequestId, decider: &str) -> Result<AccessRequest, StoreError> {
        self.ledger()
            .reject(id, &self.settings.resolve_identity(decider))
    }

    pub fn get_request(&self, id: &RequestId) -> Result<AccessRequest, StoreError> {
        self.ledger()
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))
    }

    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<AccessRequest>, StoreError> {
        self.ledger().list(filter)
    }

    pub fn requester_stats(&self, requester: &str) -> Result<RequesterStats, StoreError> {
        self.ledger().stats(requester)
    }

    pub fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let trail = SqliteAuditTrail::new(self.db);
        let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
        match &query.resource {
            Some(resource) => trail.for_resource(resource, limit, query.before),
            None => trail.query(limit, query.before),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::KEY_LEN;
    use crate::store::{AuditAction, AuditOutcome, ErrorKind, RequestStatus, SecretKind};
    use std::path::PathBuf;
    use std::sync::{Arc, Barrier};

    fn settings() -> Settings {
        Settings {
            data_dir: PathBuf::from("/nonexistent"),
            grant_ttl: None,
            admins: vec!["admin".to_string(), "admin1".to_string(), "admin2".to_string()],
            vault: None,
            identity: "admin".to_string(),
        }
    }

    fn cipher() -> Cipher {
        Cipher::new(&[3u8; KEY_LEN]).unwrap()
    }

    fn db_prod() -> NewSecret {
        NewSecret {
            name: "db-prod".to_string(),
            description: "Primary Postgres".to_string(),
            kind: SecretKind::Database,
            plaintext: Zeroizing::new("p@ssw0rd".to_string()),
        }
    }

    fn request(secret: &str, requester: &str) -> CreateRequestInput {
        CreateRequestInput {
            secret_name: secret.to_string(),
            requester: requester.to_string(),
            justification: "need for migration".to_string(),
        }
    }

    #[test]
    fn test_read_without_request_is_unauthorized() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();

        let err = service.get_secret_value("db-prod", "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_approved_request_releases_value() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let pending = service.create_request(&request("db-prod", "alice")).unwrap();
        assert_eq!(pending.status, RequestStatus::Pending);

        let approved = service.approve_request(&pending.id, "admin").unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.decider.as_deref(), Some("admin"));

        let released = service.get_secret_value("db-prod", "alice").unwrap();
        assert_eq!(released.value.as_str(), "p@ssw0rd");
    }

    #[test]
    fn test_rejected_request_keeps_value_sealed() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let pending = service.create_request(&request("db-prod", "alice")).unwrap();
        service.reject_request(&pending.id, "admin").unwrap();

        let err = service.get_secret_value("db-prod", "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_grant_does_not_transfer_between_identities() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let pending = service.create_request(&request("db-prod", "alice")).unwrap();
        service.approve_request(&pending.id, "admin").unwrap();

        let err = service.get_secret_value("db-prod", "mallory").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_concurrent_approve_and_reject_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");
        let (cipher, settings) = (cipher(), settings());

        let request_id = {
            let db = Database::open(&path).unwrap();
            let service = AccessService::new(&db, &cipher, &settings);
            service.create_secret("admin", db_prod()).unwrap();
            service.create_request(&request("db-prod", "alice")).unwrap().id
        };

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["admin1", "admin2"]
            .into_iter()
            .map(|decider| {
                let (barrier, path) = (barrier.clone(), path.clone());
                let (cipher, settings) = (cipher.clone(), settings.clone());
                std::thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    let service = AccessService::new(&db, &cipher, &settings);
                    barrier.wait();
                    if decider == "admin1" {
                        service.approve_request(&request_id, decider)
                    } else {
                        service.reject_request(&request_id, decider)
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::InvalidTransition));
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        let first = service.create_secret("admin", db_prod()).unwrap();
        let err = service.create_secret("admin", db_prod()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);

        let meta = service.get_secret_metadata("db-prod").unwrap();
        assert_eq!(meta.id, Some(first.id));
        assert_eq!(
            service.get_secret_value("db-prod", "admin").unwrap().value.as_str(),
            "p@ssw0rd"
        );
    }

    #[test]
    fn test_every_value_read_leaves_one_matching_audit_entry() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let _ = service.get_secret_value("db-prod", "alice");
        let _ = service.get_secret_value("db-prod", "admin");
        let _ = service.get_secret_value("missing", "admin");

        let reads: Vec<_> = service
            .list_audit(&AuditQuery::default())
            .unwrap()
            .into_iter()
            .filter(|e| e.action == AuditAction::ReadAttempt)
            .map(|e| (e.actor, e.resource, e.outcome))
            .collect();

        assert_eq!(
            reads,
            vec![
                ("admin".to_string(), "missing".to_string(), AuditOutcome::Error),
                ("admin".to_string(), "db-prod".to_string(), AuditOutcome::Success),
                ("alice".to_string(), "db-prod".to_string(), AuditOutcome::Denied),
            ]
        );
    }

    #[test]
    fn test_list_audit_by_resource_and_limit() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let pending = service.create_request(&request("db-prod", "alice")).unwrap();
        service.approve_request(&pending.id, "admin").unwrap();

        let history = service
            .list_audit(&AuditQuery {
                resource: Some(pending.id.to_string()),
                ..AuditQuery::default()
            })
            .unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Approve, AuditAction::CreateRequest]);

        let limited = service
            .list_audit(&AuditQuery {
                limit: Some(1),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_request_queue_and_stats() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let first = service.create_request(&request("db-prod", "alice")).unwrap();
        service.reject_request(&first.id, "admin").unwrap();
        let second = service.create_request(&request("db-prod", "alice")).unwrap();

        let queue = service
            .list_requests(&RequestFilter {
                status: Some(RequestStatus::Pending),
                ..RequestFilter::default()
            })
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, second.id);

        let stats = service.requester_stats("alice").unwrap();
        assert_eq!((stats.total, stats.pending, stats.rejected), (2, 1, 1));

        assert_eq!(service.get_request(&first.id).unwrap().status, RequestStatus::Rejected);
        let unknown = uuid::Uuid::new_v4();
        assert_eq!(service.get_request(&unknown).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_member_cannot_decide() {
        let db = Database::open_in_memory().unwrap();
        let (cipher, settings) = (cipher(), settings());
        let service = AccessService::new(&db, &cipher, &settings);

        service.create_secret("admin", db_prod()).unwrap();
        let pending = service.create_request(&request("db-prod", "alice")).unwrap();

        let err = service.approve_request(&pending.id, "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(service.get_request(&pending.id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_secret_value_debug_is_redacted() {
        let value = SecretValue {
            name: "db-prod".to_string(),
            value: Zeroizing::new("p@ssw0rd".to_string()),
        };
        assert!(!format!("{:?}", value).contains("p@ssw0rd"));
        assert!(serde_json::to_string(&value).unwrap().contains("p@ssw0rd"));
    }
}
