// Warden — Authorization Gate
//
// Decides whether plaintext may be released to an identity. Admins always
// pass; everyone else needs their own most recent request for the secret to
// be Approved and, when a grant TTL is configured, decided within the TTL.
// The gate has no side effects. The secret repository audits its verdict.

use chrono::{Duration, Utc};

use super::ledger::RequestLedger;
use super::models::{Identity, RequestId, RequestStatus};
use super::StoreError;

/// Outcome of evaluating one (identity, secret) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admin,
    Granted(RequestId),
    NoRequest,
    Pending(RequestId),
    Rejected(RequestId),
    Expired(RequestId),
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Admin | Self::Granted(_))
    }

    /// Short explanation recorded in the audit entry.
    pub fn reason(&self) -> String {
        match self {
            Self::Admin => "admin role".to_string(),
            Self::Granted(id) => format!("grant {}", id),
            Self::NoRequest => "no access request".to_string(),
            Self::Pending(id) => format!("request {} is pending", id),
            Self::Rejected(id) => format!("request {} was rejected", id),
            Self::Expired(id) => format!("grant {} has expired", id),
        }
    }
}

pub struct AuthorizationGate<'a> {
    ledger: &'a dyn RequestLedger,
    grant_ttl: Option<Duration>,
}

impl<'a> AuthorizationGate<'a> {
    /// `grant_ttl = None` makes approvals permanent.
    pub fn new(ledger: &'a dyn RequestLedger, grant_ttl: Option<Duration>) -> Self {
        Self { ledger, grant_ttl }
    }

    pub fn is_authorized(&self, identity: &Identity, secret_name: &str) -> Result<bool, StoreError> {
        Ok(self.evaluate(identity, secret_name)?.is_granted())
    }

    pub fn evaluate(&self, identity: &Identity, secret_name: &str) -> Result<Verdict, StoreError> {
        if identity.is_admin() {
            return Ok(Verdict::Admin);
        }

        let request = match self.ledger.find(secret_name, &identity.name)? {
            Some(r) => r,
            None => return Ok(Verdict::NoRequest),
        };

        let verdict = match request.status {
            RequestStatus::Pending => Verdict::Pending(request.id),
            RequestStatus::Rejected => Verdict::Rejected(request.id),
            RequestStatus::Approved => match (self.grant_ttl, request.decided_at) {
                (None, _) => Verdict::Granted(request.id),
                (Some(ttl), Some(decided_at)) => match decided_at.checked_add_signed(ttl) {
                    Some(expires_at) if Utc::now() > expires_at => Verdict::Expired(request.id),
                    // Past the representable calendar: never expires.
                    _ => Verdict::Granted(request.id),
                },
                // No decision time on an approved row counts as expired.
                (Some(_), None) => Verdict::Expired(request.id),
            },
        };
        Ok(verdict)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
