//! Typed key-value storage for device-scoped client state.
//!
//! [`KeyValueStore`] is the seam components receive instead of reaching for
//! a global. [`LocalStore`] backs it with the sqlite `local_settings` table,
//! one category per store so unrelated state can be cleared independently.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::db::{self, DbState};
use crate::error::CafeError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CafeError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CafeError>;

    /// Remove one key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CafeError>;

    /// Remove every key owned by this store.
    fn clear(&self) -> Result<(), CafeError>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CafeError>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                warn!(key, error = %e, "stored value is not valid JSON");
                CafeError::Storage(format!("{key}: {e}"))
            }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CafeError>
    where
        Self: Sized,
    {
        let raw = serde_json::to_string(value)
            .map_err(|e| CafeError::Storage(format!("{key}: {e}")))?;
        self.set(key, &raw)
    }

    fn get_bool(&self, key: &str) -> Result<bool, CafeError> {
        Ok(self
            .get(key)?
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false))
    }
}

/// sqlite-backed store scoped to one settings category.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<DbState>,
    category: String,
}

impl LocalStore {
    pub fn new(db: Arc<DbState>, category: impl Into<String>) -> Self {
        Self {
            db,
            category: category.into(),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, CafeError>,
    ) -> Result<T, CafeError> {
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| CafeError::Storage(format!("database lock poisoned: {e}")))?;
        f(&conn)
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, CafeError> {
        self.with_conn(|conn| db::get_setting(conn, &self.category, key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CafeError> {
        self.with_conn(|conn| db::set_setting(conn, &self.category, key, value))
    }

    fn remove(&self, key: &str) -> Result<(), CafeError> {
        self.with_conn(|conn| db::delete_setting(conn, &self.category, key))
    }

    fn clear(&self) -> Result<(), CafeError> {
        self.with_conn(|conn| db::delete_all_settings(conn, &self.category))
    }
}
