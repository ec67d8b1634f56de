// Warden — Request Ledger
//
// Owns the access-request state machine: Pending -> Approved | Rejected.
// Every transition is one conditional UPDATE (`... WHERE id = ? AND status =
// 'pending'`), so concurrent approve/reject calls on the same request race on
// the database write lock and exactly one of them changes the row. The loser
// sees zero affected rows and gets `InvalidTransition`.
//
// Each call writes exactly one audit entry. Successful writes commit the
// audit entry in the same transaction as the change itself.

use chrono::{SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::audit;
use super::db::{self, Database};
use super::models::{
    AccessRequest, AuditAction, AuditOutcome, Identity, NewAuditEntry, RequestFilter, RequestId,
    RequestStatus, RequesterStats,
};
use super::StoreError;

/// Default page size when a listing does not ask for one.
const DEFAULT_LIST_LIMIT: usize = 100;

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait RequestLedger {
    /// Open a Pending request. Fails with `NotFound` if the secret does not exist.
    fn create(
        &self,
        secret_name: &str,
        requester: &Identity,
        justification: &str,
    ) -> Result<AccessRequest, StoreError>;

    /// Pending -> Approved. `NotFound`, `InvalidTransition`, or `Unauthorized`
    /// when the decider is not an admin.
    fn approve(&self, id: &RequestId, decider: &Identity) -> Result<AccessRequest, StoreError>;

    /// Pending -> Rejected. Same failure modes as `approve`.
    fn reject(&self, id: &RequestId, decider: &Identity) -> Result<AccessRequest, StoreError>;

    /// The most recent request by `requester` for `secret_name`.
    fn find(&self, secret_name: &str, requester: &str)
        -> Result<Option<AccessRequest>, StoreError>;

    fn get(&self, id: &RequestId) -> Result<Option<AccessRequest>, StoreError>;

    /// Newest first.
    fn list(&self, filter: &RequestFilter) -> Result<Vec<AccessRequest>, StoreError>;

    fn stats(&self, requester: &str) -> Result<RequesterStats, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

const SELECT_COLUMNS: &str = "SELECT id, secret_name, requester, justification, status, decider,
                                     created_at, decided_at
                              FROM access_requests";

pub struct SqliteRequestLedger<'a> {
    db: &'a Database,
}

impl<'a> SqliteRequestLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRequest> {
        let id: String = row.get(0)?;
        let status: String = row.get(4)?;
        let created_at: String = row.get(6)?;
        let decided_at: Option<String> = row.get(7)?;

        Ok(AccessRequest {
            id: db::parse_uuid(0, &id)?,
            secret_name: row.get(1)?,
            requester: row.get(2)?,
            justification: row.get(3)?,
            status: db::parse_column(4, &status)?,
            decider: row.get(5)?,
            created_at: db::parse_timestamp(6, &created_at)?,
            decided_at: decided_at
                .as_deref()
                .map(|raw| db::parse_timestamp(7, raw))
                .transpose()?,
        })
    }

    fn fetch(conn: &Connection, id: &RequestId) -> Result<Option<AccessRequest>, StoreError> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let request = conn
            .query_row(&sql, params![id.to_string()], Self::row_to_request)
            .optional()?;
        Ok(request)
    }

    fn decide(
        &self,
        id: &RequestId,
        decider: &Identity,
        target: RequestStatus,
    ) -> Result<AccessRequest, StoreError> {
        let action = match target {
            RequestStatus::Approved => AuditAction::Approve,
            RequestStatus::Rejected => AuditAction::Reject,
            RequestStatus::Pending => {
                return Err(StoreError::Other("pending is not a decision".to_string()))
            }
        };
        let resource = id.to_string();

        if !decider.is_admin() {
            audit::append(
                self.db.conn(),
                &NewAuditEntry::new(&decider.name, action, &resource, AuditOutcome::Denied)
                    .with_details("decider does not hold the admin role"),
            )?;
            tracing::warn!(request_id = %id, decider = %decider, "Decision refused: not an admin");
            return Err(StoreError::Unauthorized);
        }

        let now = Utc::now().trunc_subsecs(6);
        let tx = self.db.write_tx()?;

        let changed = tx.execute(
            "UPDATE access_requests
             SET status = ?1, decider = ?2, decided_at = ?3
             WHERE id = ?4 AND status = 'pending'",
            params![target.as_str(), decider.name, db::timestamp(now), resource],
        )?;

        if changed == 1 {
            let request = Self::fetch(&tx, id)?
                .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))?;
            audit::append(
                &tx,
                &NewAuditEntry::new(&decider.name, action, &resource, AuditOutcome::Success)
                    .with_details(format!("secret={} requester={}", request.secret_name, request.requester)),
            )?;
            tx.commit()?;

            tracing::info!(
                request_id = %id,
                decider = %decider,
                status = %target,
                "Access request decided"
            );
            return Ok(request);
        }

        // Either the id is unknown or another decision already won.
        let (err, outcome, details) = match Self::fetch(&tx, id)? {
            None => (
                StoreError::NotFound(format!("request {}", id)),
                AuditOutcome::Error,
                "request not found".to_string(),
            ),
            Some(current) => (
                StoreError::InvalidTransition {
                    id: *id,
                    status: current.status,
                },
                AuditOutcome::Denied,
                format!("request already {}", current.status),
            ),
        };
        audit::append(
            &tx,
            &NewAuditEntry::new(&decider.name, action, &resource, outcome).with_details(details),
        )?;
        tx.commit()?;

        tracing::debug!(request_id = %id, error = %err, "Decision rejected");
        Err(err)
    }
}

impl<'a> RequestLedger for SqliteRequestLedger<'a> {
    fn create(
        &self,
        secret_name: &str,
        requester: &Identity,
        justification: &str,
    ) -> Result<AccessRequest, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(6);

        let tx = self.db.write_tx()?;

        // Existence check and insert in one statement.
        let inserted = tx.execute(
            "INSERT INTO access_requests
                (id, secret_name, requester, justification, status, created_at)
             SELECT ?1, ?2, ?3, ?4, 'pending', ?5
             WHERE EXISTS (SELECT 1 FROM secrets WHERE name = ?2)",
            params![
                id.to_string(),
                secret_name,
                requester.name,
                justification,
                db::timestamp(now),
            ],
        )?;

        if inserted == 0 {
            audit::append(
                &tx,
                &NewAuditEntry::new(
                    &requester.name,
                    AuditAction::CreateRequest,
                    secret_name,
                    AuditOutcome::Error,
                )
                .with_details("secret not found"),
            )?;
            tx.commit()?;
            return Err(StoreError::NotFound(format!("secret '{}'", secret_name)));
        }

        audit::append(
            &tx,
            &NewAuditEntry::new(
                &requester.name,
                AuditAction::CreateRequest,
                id.to_string(),
                AuditOutcome::Success,
            )
            .with_details(format!("secret={}", secret_name)),
        )?;
        tx.commit()?;

        tracing::info!(
            request_id = %id,
            secret = %secret_name,
            requester = %requester,
            "Access request created"
        );

        Ok(AccessRequest {
            id,
            secret_name: secret_name.to_string(),
            requester: requester.name.clone(),
            justification: justification.to_string(),
            status: RequestStatus::Pending,
            decider: None,
            created_at: now,
            decided_at: None,
        })
    }

    fn approve(&self, id: &RequestId, decider: &Identity) -> Result<AccessRequest, StoreError> {
        self.decide(id, decider, RequestStatus::Approved)
    }

    fn reject(&self, id: &RequestId, decider: &Identity) -> Result<AccessRequest, StoreError> {
        self.decide(id, decider, RequestStatus::Rejected)
    }

    fn find(
        &self,
        secret_name: &str,
        requester: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let sql = format!(
            "{} WHERE secret_name = ?1 AND requester = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let request = self
            .db
            .conn()
            .query_row(&sql, params![secret_name, requester], Self::row_to_request)
            .optional()?;
        Ok(request)
    }

    fn get(&self, id: &RequestId) -> Result<Option<AccessRequest>, StoreError> {
        Self::fetch(self.db.conn(), id)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<AccessRequest>, StoreError> {
        let sql = format!(
            "{} WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR requester = ?2)
               AND (?3 IS NULL OR secret_name = ?3)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4",
            SELECT_COLUMNS
        );
        let limit = i64::try_from(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)).unwrap_or(i64::MAX);

        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.status.map(|s| s.as_str()),
                filter.requester,
                filter.secret_name,
                limit,
            ],
            Self::row_to_request,
        )?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    fn stats(&self, requester: &str) -> Result<RequesterStats, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT status, count(*) FROM access_requests
             WHERE requester = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![requester], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((db::parse_column::<RequestStatus>(0, &status)?, count))
        })?;

        let mut stats = RequesterStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = u64::try_from(count).unwrap_or(0);
            match status {
                RequestStatus::Pending => stats.pending = count,
                RequestStatus::Approved => stats.approved = count,
                RequestStatus::Rejected => stats.rejected = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
