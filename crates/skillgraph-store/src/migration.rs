//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "applied schema migrations");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Every table keeps the full document as JSON in `doc`; the other columns
/// exist only to serve the query shapes of the Store trait.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE credentials (
            credential_id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            status TEXT NOT NULL,             -- pending | verified | failed | revoked
            issued_at INTEGER NOT NULL,       -- Unix ms
            expires_at INTEGER,               -- Unix ms, nullable
            doc TEXT NOT NULL
        );
        CREATE INDEX idx_credentials_candidate ON credentials(candidate_id, status);
        CREATE INDEX idx_credentials_expiry ON credentials(status, expires_at);

        -- One row per normalized skill name
        CREATE TABLE skills (
            skill_id TEXT PRIMARY KEY,
            normalized_key TEXT NOT NULL UNIQUE,
            doc TEXT NOT NULL
        );

        CREATE TABLE skill_graphs (
            candidate_id TEXT PRIMARY KEY,
            updated_at INTEGER NOT NULL,
            doc TEXT NOT NULL
        );

        CREATE TABLE issuers (
            issuer_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            doc TEXT NOT NULL
        );

        -- Append-only; message_id repeats across dispatch outcome rows
        CREATE TABLE transaction_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL,
            message_id TEXT NOT NULL,
            action TEXT NOT NULL,
            role TEXT NOT NULL,
            status TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            doc TEXT NOT NULL
        );
        CREATE INDEX idx_transaction_logs_lookup
            ON transaction_logs(transaction_id, action, role);

        CREATE TABLE verification_logs (
            workflow_id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            status TEXT NOT NULL,
            doc TEXT NOT NULL
        );
        CREATE INDEX idx_verification_logs_candidate ON verification_logs(candidate_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
