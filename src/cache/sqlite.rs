//! SQLite cache backend
//!
//! Persists responses across runs. Headers are stored as a JSON array of
//! name/value pairs and bodies as BLOBs.

use crate::cache::schema::initialize_schema;
use crate::cache::traits::{Cache, CacheError, CacheResult, CachedResponse};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed response cache
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens (or creates) a cache database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCache)` - Successfully opened/created database
    /// * `Err(CacheError)` - Failed to open database or create the schema
    pub fn new(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a cache that lives only as long as this value
    pub fn new_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl Cache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, headers, body, stored_at FROM responses WHERE cache_key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, u16>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, headers, body, stored_at)) = row else {
            return Ok(None);
        };

        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(CachedResponse {
            status,
            headers: serde_json::from_str(&headers)?,
            body,
            stored_at,
        }))
    }

    fn set(&self, key: &str, response: &CachedResponse) -> CacheResult<()> {
        let headers = serde_json::to_string(&response.headers)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO responses (cache_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                response.status,
                headers,
                response.body,
                response.stored_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.conn()?.execute("DELETE FROM responses", [])?;
        Ok(())
    }

    fn len(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
