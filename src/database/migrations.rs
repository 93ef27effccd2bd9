use log::{debug, info, warn};
use rusqlite::{Connection, Transaction};

use crate::security::SecurityError;

// Database schema version
pub const CURRENT_VERSION: u32 = 1;

/// Bring the rate-limit schema up to `CURRENT_VERSION`
pub fn run_migrations(conn: &mut Connection) -> Result<(), SecurityError> {
    debug!("Checking database version");

    let version = get_database_version(conn)?;

    if version == CURRENT_VERSION {
        debug!("Database schema is up to date (version {})", version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", version, CURRENT_VERSION);

    // All steps commit together or not at all
    let tx = conn.transaction()?;

    for v in version..CURRENT_VERSION {
        let migration_fn = match v {
            0 => migrate_v0_to_v1,
            _ => {
                warn!("No migration function found for version {}", v);
                continue;
            }
        };

        debug!("Running migration from version {} to {}", v, v + 1);
        migration_fn(&tx)?;
    }

    set_database_version(&tx, CURRENT_VERSION)?;
    tx.commit()?;

    info!("Database migration completed successfully to version {}", CURRENT_VERSION);
    Ok(())
}

/// Get the current database version, creating the version table on first use
pub fn get_database_version(conn: &Connection) -> Result<u32, SecurityError> {
    let version_table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='database_version')",
        [],
        |row| row.get(0),
    )?;

    if !version_table_exists {
        conn.execute("CREATE TABLE database_version (version INTEGER NOT NULL)", [])?;
        conn.execute("INSERT INTO database_version (version) VALUES (0)", [])?;
        return Ok(0);
    }

    let version: u32 = conn.query_row("SELECT version FROM database_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_database_version(conn: &Connection, version: u32) -> Result<(), SecurityError> {
    conn.execute("UPDATE database_version SET version = ?1", [version])?;
    Ok(())
}

/// Rate-limit entries keyed by hashed identifier, timestamps in epoch millis
fn migrate_v0_to_v1(tx: &Transaction) -> Result<(), SecurityError> {
    tx.execute(
        "CREATE TABLE IF NOT EXISTS rate_limit_entries (
            identifier_hash TEXT PRIMARY KEY,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt INTEGER NOT NULL,
            blocked_until INTEGER
        )",
        [],
    )?;

    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_rate_limit_last_attempt ON rate_limit_entries(last_attempt)",
        [],
    )?;

    debug!("Migration from version 0 to 1 completed");
    Ok(())
}
