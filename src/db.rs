//! Local SQLite database layer.
//!
//! Uses rusqlite with WAL mode. Holds the device-scoped key-value settings
//! (user identity and flags) so they survive restarts.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::CafeError;

/// Shared database handle.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initialize the database at `{data_dir}/cafe.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, CafeError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| CafeError::Storage(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("cafe.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path).map_err(|e| {
                CafeError::Storage(format!("Database open failed after retry: {e}"))
            })?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// In-memory database with the full schema. Nothing survives the process.
pub fn open_in_memory() -> Result<DbState, CafeError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, CafeError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), CafeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration v1: category/key/value settings store.
fn migrate_v1(conn: &Connection) -> Result<(), CafeError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key
            ON local_settings(setting_category, setting_key);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Read a single setting value. A missing row is `None`; any other SQL
/// failure is an error.
pub fn get_setting(
    conn: &Connection,
    category: &str,
    key: &str,
) -> Result<Option<String>, CafeError> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| CafeError::Storage(format!("get_setting: {e}")))
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), CafeError> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| CafeError::Storage(format!("set_setting: {e}")))?;
    Ok(())
}

/// Delete one setting. Succeeds if it did not exist.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> Result<(), CafeError> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )
    .map_err(|e| CafeError::Storage(format!("delete_setting: {e}")))?;
    Ok(())
}

/// Delete all settings in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> Result<(), CafeError> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        params![category],
    )
    .map_err(|e| CafeError::Storage(format!("delete_all_settings: {e}")))?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_settings_table() {
        let db = open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let tables = table_names(&conn);
        assert!(tables.contains(&"local_settings".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        run_migrations(&conn).expect("second run should be a no-op");
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_setting_upsert_and_delete() {
        let db = open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        assert_eq!(get_setting(&conn, "identity", "nickname").unwrap(), None);
        set_setting(&conn, "identity", "nickname", "mika").unwrap();
        set_setting(&conn, "identity", "nickname", "sora").unwrap();
        assert_eq!(
            get_setting(&conn, "identity", "nickname").unwrap().as_deref(),
            Some("sora")
        );

        delete_setting(&conn, "identity", "nickname").unwrap();
        delete_setting(&conn, "identity", "nickname").unwrap();
        assert_eq!(get_setting(&conn, "identity", "nickname").unwrap(), None);
    }

    #[test]
    fn test_delete_all_settings_is_scoped_to_category() {
        let db = open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        set_setting(&conn, "identity", "a", "1").unwrap();
        set_setting(&conn, "identity", "b", "2").unwrap();
        set_setting(&conn, "other", "a", "3").unwrap();

        delete_all_settings(&conn, "identity").unwrap();
        assert_eq!(get_setting(&conn, "identity", "a").unwrap(), None);
        assert_eq!(get_setting(&conn, "other", "a").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_get_setting_surfaces_sql_errors() {
        let db = open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        conn.execute_batch("DROP TABLE local_settings").unwrap();

        let err = get_setting(&conn, "identity", "nickname").unwrap_err();
        assert!(matches!(err, CafeError::Storage(ref m) if m.starts_with("get_setting:")));
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("cafe-db-test-{}", uuid::Uuid::new_v4()));
        {
            let db = init(&dir).unwrap();
            let conn = db.conn.lock().unwrap();
            set_setting(&conn, "identity", "nickname", "mika").unwrap();
        }
        {
            let db = init(&dir).unwrap();
            let conn = db.conn.lock().unwrap();
            assert_eq!(
                get_setting(&conn, "identity", "nickname").unwrap().as_deref(),
                Some("mika")
            );
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
