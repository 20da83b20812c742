//! Embedded SQL migrations and runner.
//!
//! Migrations are `&str` constants applied in order. A `schema_migrations`
//! table records which versions have run.

use rusqlite::Connection;
use rf_core::{Error, Result};

/// V1: video records.
const V1_VIDEOS: &str = r#"
CREATE TABLE videos (
    id                  TEXT PRIMARY KEY,
    owner_id            TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    status              INTEGER NOT NULL DEFAULT 0
                        CHECK (status IN (-1, 0, 1, 2)),
    thumbnail_url       TEXT,
    upload_initiated_at TEXT NOT NULL,
    upload_completed_at TEXT,
    deleted             INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_videos_owner ON videos(owner_id, deleted, upload_initiated_at);
"#;

/// V2: speed up the startup sweep over unfinished uploads.
const V2_STATUS_INDEX: &str = r#"
CREATE INDEX idx_videos_status ON videos(status) WHERE deleted = 0;
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_VIDEOS), (2, V2_STATUS_INDEX)];

/// Run all pending migrations on `conn`.
///
/// Each outstanding migration runs inside its own transaction together with
/// its `schema_migrations` row.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
            .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}
