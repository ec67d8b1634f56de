// Warden — Data models
//
// SECURITY: `Secret::ciphertext` is private and redacted from Debug output.
// Plaintext never appears in any model here; it only exists transiently as a
// `Zeroizing<String>` returned by the secret repository.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::StoreError;

/// Identifier assigned to a secret at creation.
pub type SecretId = Uuid;

/// Identifier assigned to an access request at creation.
pub type RequestId = Uuid;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Elevated role carried by a resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// An authenticated principal, as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Admin,
        }
    }

    pub fn member(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ─── Secrets ─────────────────────────────────────────────────────────────────

/// What kind of credential a secret holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Database,
    ApiKey,
    SshKey,
    Certificate,
    Other,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::ApiKey => "api_key",
            Self::SshKey => "ssh_key",
            Self::Certificate => "certificate",
            Self::Other => "other",
        }
    }
}

impl FromStr for SecretKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(Self::Database),
            "api_key" => Ok(Self::ApiKey),
            "ssh_key" => Ok(Self::SshKey),
            "certificate" => Ok(Self::Certificate),
            "other" => Ok(Self::Other),
            other => Err(StoreError::Other(format!("unknown secret kind '{}'", other))),
        }
    }
}

/// A stored secret row. Always holds ciphertext, never plaintext.
pub struct Secret {
    pub id: SecretId,
    pub name: String,
    pub description: String,
    pub kind: SecretKind,
    ciphertext: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Secret {
    pub fn new(
        id: SecretId,
        name: String,
        description: String,
        kind: SecretKind,
        ciphertext: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            kind,
            ciphertext,
            created_at,
        }
    }

    /// Sealed payload as produced by the cipher boundary.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Metadata view with the payload stripped.
    pub fn metadata(&self) -> SecretMetadata {
        SecretMetadata {
            id: Some(self.id),
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            origin: SecretOrigin::Local,
            created_at: Some(self.created_at),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("ciphertext", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Where a secret's metadata was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretOrigin {
    Local,
    Vault,
}

/// Secret without its value. Safe to serialize and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Absent for secrets served by the external vault.
    pub id: Option<SecretId>,
    pub name: String,
    pub description: String,
    pub kind: SecretKind,
    pub origin: SecretOrigin,
    pub created_at: Option<DateTime<Utc>>,
}

impl fmt::Display for SecretMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.kind.as_str(), self.description)
    }
}

/// Input for creating a secret. The plaintext is consumed and zeroized on drop.
pub struct NewSecret {
    pub name: String,
    pub description: String,
    pub kind: SecretKind,
    pub plaintext: Zeroizing<String>,
}

impl fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSecret")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("plaintext", &"[REDACTED]")
            .finish()
    }
}

// ─── Access Requests ─────────────────────────────────────────────────────────

/// Lifecycle state of an access request. The single source of truth;
/// `Pending` is initial, the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(StoreError::Other(format!("unknown request status '{}'", other))),
        }
    }
}

/// One identity's request to read one secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: RequestId,
    pub secret_name: String,
    pub requester: String,
    pub justification: String,
    pub status: RequestStatus,
    pub decider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Convenience view derived from `status`.
    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }
}

/// Optional filters for listing requests. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requester: Option<String>,
    pub secret_name: Option<String>,
    pub limit: Option<usize>,
}

/// Per-requester request counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateSecret,
    CreateRequest,
    Approve,
    Reject,
    ReadAttempt,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSecret => "create_secret",
            Self::CreateRequest => "create_request",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::ReadAttempt => "read_attempt",
        }
    }
}

impl FromStr for AuditAction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_secret" => Ok(Self::CreateSecret),
            "create_request" => Ok(Self::CreateRequest),
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "read_attempt" => Ok(Self::ReadAttempt),
            other => Err(StoreError::Other(format!("unknown audit action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "denied" => Ok(Self::Denied),
            "error" => Ok(Self::Error),
            other => Err(StoreError::Other(format!("unknown audit outcome '{}'", other))),
        }
    }
}

/// An entry to append. The trail assigns timestamp and sequence.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub action: AuditAction,
    pub resource: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

impl NewAuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        resource: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            resource: resource.into(),
            outcome,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// An immutable, recorded audit fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub resource: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} by '{}' → {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action.as_str(),
            self.resource,
            self.actor,
            self.outcome.as_str()
        )?;
        if let Some(ref d) = self.details {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_secret() -> Secret {
        Secret::new(
            Uuid::new_v4(),
            "db-prod".to_string(),
            "Primary Postgres".to_string(),
            SecretKind::Database,
            vec![0xde, 0xad, 0xbe, 0xef],
            Utc::now(),
        )
    }

    #[test]
    fn test_secret_debug_redacts_ciphertext() {
        let output = format!("{:?}", sample_secret());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("222, 173"), "ciphertext bytes must not be printed");
    }

    #[test]
    fn test_new_secret_debug_redacts_plaintext() {
        let new = NewSecret {
            name: "x".to_string(),
            description: String::new(),
            kind: SecretKind::Other,
            plaintext: Zeroizing::new("p@ssw0rd".to_string()),
        };
        let output = format!("{:?}", new);
        assert!(!output.contains("p@ssw0rd"));
    }

    #[test]
    fn test_metadata_serialization_has_no_payload() {
        let json = serde_json::to_string(&sample_secret().metadata()).unwrap();
        assert!(!json.contains("ciphertext"));
        assert!(json.contains("\"origin\":\"local\""));
        assert!(json.contains("\"kind\":\"database\""));
    }

    #[test]
    fn test_secret_kind_string_forms_agree_with_serde() {
        for kind in [
            SecretKind::Database,
            SecretKind::ApiKey,
            SecretKind::SshKey,
            SecretKind::Certificate,
            SecretKind::Other,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<SecretKind>().unwrap(), kind);
        }
        assert!("password".parse::<SecretKind>().is_err());
    }

    #[test]
    fn test_request_status_terminality() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("APPROVED".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_audit_enums_parse_their_own_strings() {
        for action in [
            AuditAction::CreateSecret,
            AuditAction::CreateRequest,
            AuditAction::Approve,
            AuditAction::Reject,
            AuditAction::ReadAttempt,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        for outcome in [AuditOutcome::Success, AuditOutcome::Denied, AuditOutcome::Error] {
            assert_eq!(outcome.as_str().parse::<AuditOutcome>().unwrap(), outcome);
        }
    }

    #[test]
    fn test_identity_roles() {
        assert!(Identity::admin("root").is_admin());
        assert!(!Identity::member("alice").is_admin());
        assert_eq!(Identity::member("alice").to_string(), "alice");
    }
}
