// Warden — SQLite Database Management
//
// Opens the database and runs schema migrations. Secret payloads are sealed
// by the cipher boundary before they reach this layer, so the file itself
// holds no plaintext. File databases use WAL and a busy timeout so concurrent
// connections queue for the write lock instead of failing fast.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::StoreError;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrapper around a SQLite connection with the Warden schema applied.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, path = %path.display(), "Database opened");

        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction that takes the write lock up front, waiting out
    /// other writers through the busy timeout.
    pub fn write_tx(&self) -> Result<Transaction<'_>, StoreError> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS secrets (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                description     TEXT NOT NULL DEFAULT '',
                kind            TEXT NOT NULL,
                ciphertext      BLOB NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS access_requests (
                id              TEXT PRIMARY KEY,
                secret_name     TEXT NOT NULL,
                requester       TEXT NOT NULL,
                justification   TEXT NOT NULL DEFAULT '',
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'approved', 'rejected')),
                decider         TEXT,
                created_at      TEXT NOT NULL,
                decided_at      TEXT,
                FOREIGN KEY(secret_name) REFERENCES secrets(name)
            );

            CREATE INDEX IF NOT EXISTS idx_requests_secret_requester
                ON access_requests(secret_name, requester);

            CREATE TABLE IF NOT EXISTS audit_entries (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp       TEXT NOT NULL,
                actor           TEXT NOT NULL,
                action          TEXT NOT NULL,
                resource        TEXT NOT NULL,
                outcome         TEXT NOT NULL,
                details         TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp
                ON audit_entries(timestamp);

            -- Terminal request states are final.
            CREATE TRIGGER IF NOT EXISTS access_requests_terminal
                BEFORE UPDATE OF status ON access_requests
                WHEN OLD.status <> 'pending'
            BEGIN
                SELECT RAISE(ABORT, 'request already decided');
            END;

            -- The audit trail is insert-only.
            CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
                BEFORE UPDATE ON audit_entries
            BEGIN
                SELECT RAISE(ABORT, 'audit entries are append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
                BEFORE DELETE ON audit_entries
            BEGIN
                SELECT RAISE(ABORT, 'audit entries are append-only');
            END;
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

/// Fixed-width RFC 3339 so that lexical order equals chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a stored enum column via its `FromStr` impl.
pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = StoreError>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(db: &Database, name: &str) -> bool {
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_schema_migration_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        for table in ["secrets", "access_requests", "audit_entries"] {
            assert!(table_exists(&db, table), "{} table should exist", table);
        }
    }

    #[test]
    fn test_schema_migration_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.run_migrations().is_ok());
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("warden.db")).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_secret_names_are_unique() {
        let db = Database::open_in_memory().unwrap();
        let insert = "INSERT INTO secrets (id, name, kind, ciphertext, created_at)
                      VALUES (?1, 'dup', 'other', x'00', '2024-01-01T00:00:00.000000Z')";
        db.conn().execute(insert, ["a"]).unwrap();
        assert!(db.conn().execute(insert, ["b"]).is_err());
    }

    #[test]
    fn test_audit_entries_cannot_be_updated_or_deleted() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO audit_entries (timestamp, actor, action, resource, outcome)
                 VALUES ('2024-01-01T00:00:00.000000Z', 'alice', 'read_attempt', 'x', 'denied')",
                [],
            )
            .unwrap();

        assert!(db
            .conn()
            .execute("UPDATE audit_entries SET outcome = 'success'", [])
            .is_err());
        assert!(db.conn().execute("DELETE FROM audit_entries", []).is_err());
    }

    #[test]
    fn test_decided_requests_cannot_change_status() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO secrets (id, name, kind, ciphertext, created_at)
                 VALUES ('s', 'db', 'other', x'00', '2024-01-01T00:00:00.000000Z');
                 INSERT INTO access_requests (id, secret_name, requester, status, created_at)
                 VALUES ('r', 'db', 'alice', 'approved', '2024-01-01T00:00:00.000000Z');",
            )
            .unwrap();

        let result = db
            .conn()
            .execute("UPDATE access_requests SET status = 'rejected' WHERE id = 'r'", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        use chrono::SubsecRound;

        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(timestamp(early).len(), timestamp(late).len());
        assert_eq!(
            parse_timestamp(0, &timestamp(early)).unwrap(),
            early.trunc_subsecs(6)
        );
    }
}
