// Warden — Audit Trail
//
// Append-only record of every decision and access attempt. Other components
// write through `append()` on the same connection (often inside their own
// transaction) so that the audited operation and its entry commit together.
// Nothing in the crate updates or deletes entries; the schema enforces it too.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection};

use super::db::{self, Database};
use super::models::{AuditEntry, NewAuditEntry};
use super::StoreError;

/// Append-only audit log.
pub trait AuditTrail {
    /// Append one entry. Fails only when storage is unavailable.
    fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Most-recent-first, at most `limit` entries, optionally strictly older than `before`.
    fn query(
        &self,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    /// Same as `query`, restricted to one secret name or request id.
    fn for_resource(
        &self,
        resource: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError>;
}

pub struct SqliteAuditTrail<'a> {
    db: &'a Database,
}

impl<'a> SqliteAuditTrail<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

/// Insert `entry` on `conn`, stamping it with the current time.
/// Accepts a `Transaction` (via deref) so callers can couple it to their write.
pub(crate) fn append(conn: &Connection, entry: &NewAuditEntry) -> Result<AuditEntry, StoreError> {
    let now = Utc::now().trunc_subsecs(6);
    conn.execute(
        "INSERT INTO audit_entries (timestamp, actor, action, resource, outcome, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            db::timestamp(now),
            entry.actor,
            entry.action.as_str(),
            entry.resource,
            entry.outcome.as_str(),
            entry.details,
        ],
    )?;

    tracing::debug!(
        actor = %entry.actor,
        action = entry.action.as_str(),
        resource = %entry.resource,
        outcome = entry.outcome.as_str(),
        "Audit entry recorded"
    );

    Ok(AuditEntry {
        sequence: conn.last_insert_rowid(),
        timestamp: now,
        actor: entry.actor.clone(),
        action: entry.action,
        resource: entry.resource.clone(),
        outcome: entry.outcome,
        details: entry.details.clone(),
    })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let timestamp: String = row.get(1)?;
    let action: String = row.get(3)?;
    let outcome: String = row.get(5)?;

    Ok(AuditEntry {
        sequence: row.get(0)?,
        timestamp: db::parse_timestamp(1, &timestamp)?,
        actor: row.get(2)?,
        action: db::parse_column(3, &action)?,
        resource: row.get(4)?,
        outcome: db::parse_column(5, &outcome)?,
        details: row.get(6)?,
    })
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl<'a> AuditTrail for SqliteAuditTrail<'a> {
    fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        append(self.db.conn(), &entry)
    }

    fn query(
        &self,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT seq, timestamp, actor, action, resource, outcome, details
             FROM audit_entries
             WHERE ?1 IS NULL OR timestamp < ?1
             ORDER BY timestamp DESC, seq DESC
             LIMIT ?2",
        )?;

        let cursor = before.map(db::timestamp);
        let rows = stmt.query_map(params![cursor, to_sql_limit(limit)], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn for_resource(
        &self,
        resource: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT seq, timestamp, actor, action, resource, outcome, details
             FROM audit_entries
             WHERE resource = ?1 AND (?3 IS NULL OR timestamp < ?3)
             ORDER BY timestamp DESC, seq DESC
             LIMIT ?2",
        )?;

        let cursor = before.map(db::timestamp);
        let rows = stmt.query_map(
            params![resource, to_sql_limit(limit), cursor],
            row_to_entry,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
