//! SQLite connection pooling via r2d2.

use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rf_core::{Error, Result};

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 4;

/// Open (or create) the database file at `db_path` and run migrations.
///
/// Every new connection gets WAL journaling and a busy timeout, so the
/// upload handlers and pipeline workers can write concurrently without
/// surfacing `SQLITE_BUSY`.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    build(manager)
}

/// Create a private in-memory database (for tests).
///
/// Each call gets its own shared-cache database name, so connections inside
/// one pool see the same data while separate pools stay isolated.
pub fn init_memory_pool() -> Result<DbPool> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:rf_memdb_{n}?mode=memory&cache=shared");

    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
    build(manager)
}

fn build(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pool_has_schema() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), POOL_SIZE);

        let conn = get_conn(&pool).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='videos'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn memory_pools_are_isolated() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();
        get_conn(&a)
            .unwrap()
            .execute(
                "INSERT INTO videos (id, owner_id, title, upload_initiated_at)
                 VALUES ('x', 'u', 't', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        let in_b: i64 = get_conn(&b)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(in_b, 0);
    }

    #[test]
    fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reelforge.db");
        let pool = init_pool(&path.to_string_lossy()).unwrap();
        let mode: String = get_conn(&pool)
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
