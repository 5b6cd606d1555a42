//! Database connection management, migrations, and error types.
//!
//! This module handles all SQLite connection setup with appropriate settings
//! for concurrent access (WAL mode, foreign keys, busy timeout), schema
//! versioning via migrations, and a unified error type for the entire crate.

use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Central error type for page operations.
///
/// The first five variants are the domain taxonomy surfaced to callers; the
/// rest wrap infrastructure failures.
#[derive(Debug, Error)]
pub enum PageError {
    /// Requested page, space, parent or history entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The acting user's ability in the space denies the action.
    #[error("Forbidden")]
    Forbidden,

    /// The request is structurally invalid (same-space target, cyclic parent).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Stored data violates a tree invariant (dangling parent, ancestor cycle).
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// The operation exists on the surface but has no implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Invalid input provided by the user or caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// I/O operation failed (directory creation, reading stdin, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PageError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::DataIntegrity(_) => "data_integrity",
            Self::NotImplemented(_) => "not_implemented",
            Self::InvalidInput(_) => "invalid_input",
            Self::Db(_) => "database",
            Self::Io(_) => "io",
        }
    }

    /// Process exit status used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::BadRequest(_) => 2,
            Self::Forbidden => 3,
            Self::NotFound(_) => 4,
            Self::DataIntegrity(_) => 5,
            Self::NotImplemented(_) | Self::Db(_) | Self::Io(_) => 1,
        }
    }
}

/// Returns the path to the SQLite database file.
///
/// Resolution order:
/// 1. `PAGETREE_DB` environment variable (if set)
/// 2. `~/.pagetree/pagetree.db` (default)
///
/// Creates the parent directory if it doesn't exist.
///
/// # Errors
///
/// Returns `PageError::Io` if the home directory cannot be determined (when
/// `PAGETREE_DB` is not set) or the parent directory cannot be created.
pub fn db_path() -> Result<PathBuf, PageError> {
    let path = if let Ok(custom) = std::env::var("PAGETREE_DB") {
        PathBuf::from(custom)
    } else {
        let home = dirs::home_dir().ok_or_else(|| {
            PageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine home directory",
            ))
        })?;
        home.join(".pagetree").join("pagetree.db")
    };

    ensure_parent_dir(&path)?;
    Ok(path)
}

/// Creates the parent directory of `path` if needed.
pub fn ensure_parent_dir(path: &std::path::Path) -> Result<(), PageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Opens a SQLite connection at the specified path with proper settings.
///
/// Configured for concurrent access from several processes:
/// - **WAL mode**: Allows concurrent readers with serialized writers
/// - **Foreign keys**: Enabled for referential integrity
/// - **Busy timeout**: 5 seconds to handle write contention gracefully
///
/// # Errors
///
/// Returns `PageError::Db` if the connection cannot be opened or configured.
pub fn open_connection_at(path: &std::path::Path) -> Result<Connection, PageError> {
    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    tracing::debug!(path = %path.display(), "opened database");
    Ok(conn)
}

/// Embedded migrations, in application order.
const MIGRATIONS: [(i64, &str); 2] = [
    (1, include_str!("../migrations/001_initial.sql")),
    (2, include_str!("../migrations/002_page_tags.sql")),
];

/// Runs all pending database migrations.
///
/// Reads the current schema version from `schema_meta` (0 when the table
/// doesn't exist yet) and applies every embedded migration above it, each in
/// its own transaction. Each migration file bumps `schema_meta.version`
/// itself.
///
/// # Errors
///
/// Returns `PageError::Db` if a migration fails; that migration's
/// transaction is rolled back.
pub fn run_migrations(conn: &mut Connection) -> Result<(), PageError> {
    let current_version: i64 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    for (target_version, sql) in MIGRATIONS {
        if target_version > current_version {
            tracing::debug!(version = target_version, "applying migration");
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.commit()?;
        }
    }

    Ok(())
}

/// Opens an in-memory database with foreign keys on and all migrations applied.
#[cfg(test)]
pub fn open_test_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
    conn.pragma_update(None, "foreign_keys", "ON")
        .expect("Failed to enable foreign keys");
    run_migrations(&mut conn).expect("Migrations should succeed");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables_from_scratch() {
        let conn = open_test_db();

        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta", [], |row| row.get(0))
            .expect("schema_meta should exist");
        assert_eq!(version, 2);

        let table_names: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("Failed to prepare query")
            .query_map([], |row| row.get(0))
            .expect("Failed to query tables")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to collect table names");

        for expected in [
            "schema_meta",
            "spaces",
            "space_members",
            "group_users",
            "pages",
            "page_contributors",
            "page_history",
            "page_tags",
        ] {
            assert!(table_names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut conn = open_test_db();

        run_migrations(&mut conn).expect("Second migration should succeed");

        let versions: Vec<i64> = conn
            .prepare("SELECT version FROM schema_meta")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(versions, vec![2]);
    }

    #[test]
    fn test_history_rows_reject_updates() {
        let conn = open_test_db();
        conn.execute_batch(
            "INSERT INTO spaces (id, workspace_id, slug, name, created_at, updated_at)
                 VALUES ('s1', 'w1', 'docs', 'Docs', 't', 't');
             INSERT INTO pages (id, space_id, workspace_id, position, creator_id, last_updated_by_id, created_at, updated_at)
                 VALUES ('p1', 's1', 'w1', 1, 'u', 'u', 't', 't');
             INSERT INTO page_history (id, page_id, space_id, version, content, author_id, created_at)
                 VALUES ('h1', 'p1', 's1', 1, 'body', 'u', 't');",
        )
        .expect("seed rows");

        let result = conn.execute("UPDATE page_history SET content = 'changed' WHERE id = 'h1'", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_open_connection_at_configures_correctly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("pages.db");
        ensure_parent_dir(&db_path).expect("create parent");

        let conn = open_connection_at(&db_path).expect("Should open connection");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("Should query journal_mode");
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("Should query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_error_kinds_map_to_exit_codes() {
        assert_eq!(PageError::Forbidden.exit_code(), 3);
        assert_eq!(PageError::NotFound("x".into()).exit_code(), 4);
        assert_eq!(PageError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(PageError::DataIntegrity("x".into()).exit_code(), 5);
        assert_eq!(PageError::NotImplemented("restore").kind(), "not_implemented");
    }
}
