use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::security::rate_limit::{EntryUpdate, RateLimitEntry, RateLimitStore};
use crate::security::{hash_identifier, SecurityError};

pub mod migrations;

// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a connection pool for the SQLite file named in `config`
pub fn create_pool(config: &StorageConfig) -> Result<Pool<SqliteConnectionManager>, SecurityError> {
    let db_path = &config.path;

    // Create directory if it doesn't exist
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));

    let pool = Pool::builder()
        .max_size(config.max_connections.max(1))
        .build(manager)?;

    debug!("Opened SQLite pool at {}", db_path);
    Ok(pool)
}

/// Rate-limit store persisted in SQLite.
///
/// State survives restarts and is shared by every process using the same
/// file; `update` runs in an immediate transaction so concurrent writers
/// never lose an attempt. Identifiers are stored as SHA-256 digests.
#[derive(Clone)]
pub struct SqliteRateLimitStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteRateLimitStore {
    /// Open (and migrate) the store described by `config`
    pub fn open(config: &StorageConfig) -> Result<Self, SecurityError> {
        Self::from_pool(create_pool(config)?)
    }

    pub fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self, SecurityError> {
        let mut conn = pool.get()?;
        migrations::run_migrations(&mut conn)?;
        info!("Rate limit store initialized");
        Ok(Self { pool })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, SecurityError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| SecurityError::Store(format!("Invalid timestamp in store: {}", millis)))
}

fn select_entry(conn: &Connection, key: &str) -> Result<Option<RateLimitEntry>, SecurityError> {
    let row: Option<(u32, i64, Option<i64>)> = conn
        .query_row(
            "SELECT attempts, last_attempt, blocked_until FROM rate_limit_entries WHERE identifier_hash = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        Some((attempts, last_attempt, blocked_until)) => Ok(Some(RateLimitEntry {
            attempts,
            last_attempt: from_millis(last_attempt)?,
            blocked_until: blocked_until.map(from_millis).transpose()?,
        })),
        None => Ok(None),
    }
}

fn write_entry(conn: &Connection, key: &str, entry: &RateLimitEntry) -> Result<(), SecurityError> {
    conn.execute(
        "INSERT OR REPLACE INTO rate_limit_entries (identifier_hash, attempts, last_attempt, blocked_until)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            key,
            entry.attempts,
            entry.last_attempt.timestamp_millis(),
            entry.blocked_until.map(|t| t.timestamp_millis()),
        ],
    )?;
    Ok(())
}

fn delete_entry(conn: &Connection, key: &str) -> Result<(), SecurityError> {
    conn.execute(
        "DELETE FROM rate_limit_entries WHERE identifier_hash = ?1",
        params![key],
    )?;
    Ok(())
}

impl RateLimitStore for SqliteRateLimitStore {
    fn get(&self, identifier: &str) -> Result<Option<RateLimitEntry>, SecurityError> {
        let conn = self.pool.get()?;
        select_entry(&conn, &hash_identifier(identifier))
    }

    fn put(&self, identifier: &str, entry: &RateLimitEntry) -> Result<(), SecurityError> {
        let conn = self.pool.get()?;
        write_entry(&conn, &hash_identifier(identifier), entry)
    }

    fn remove(&self, identifier: &str) -> Result<(), SecurityError> {
        let conn = self.pool.get()?;
        delete_entry(&conn, &hash_identifier(identifier))
    }

    fn update(
        &self,
        identifier: &str,
        apply: &dyn Fn(Option<RateLimitEntry>) -> Result<Option<RateLimitEntry>, SecurityError>,
    ) -> Result<EntryUpdate, SecurityError> {
        let key = hash_identifier(identifier);
        let mut conn = self.pool.get()?;

        // Write lock is taken before the read
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous = select_entry(&tx, &key)?;
        let current = apply(previous.clone())?;

        if current != previous {
            match &current {
                Some(entry) => write_entry(&tx, &key, entry)?,
                None => delete_entry(&tx, &key)?,
            }
        }
        tx.commit()?;

        Ok(EntryUpdate { previous, current })
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SecurityError> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM rate_limit_entries WHERE last_attempt < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize, SecurityError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM rate_limit_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
