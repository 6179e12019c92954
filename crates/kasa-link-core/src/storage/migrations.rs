//! Registry schema migrations.
//!
//! The schema version lives in `PRAGMA user_version`. Each step and its
//! version bump commit together, so a failed step leaves the previous
//! version intact and is retried on the next open.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StorageError;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

type Step = fn(&Connection) -> Result<(), StorageError>;

const STEPS: [(i32, Step); 2] = [
    (1, migrate_v1_device_list),
    (2, migrate_v2_discovery_columns),
];

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Registry schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    for (version, step) in STEPS {
        if current_version >= version {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        record_version(&tx, version)?;
        tx.commit()?;
        debug!(version, "Migration applied");
    }

    info!("Migrations complete");
    Ok(())
}

fn record_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    // PRAGMA does not accept bound parameters.
    conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
    Ok(())
}

/// V1: name -> address table. AUTOINCREMENT keeps ids from being reused
/// after deletion.
fn migrate_v1_device_list(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS device_list (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            address TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unknown',
            created_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// V2: columns fed by discovery.
fn migrate_v2_discovery_columns(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        ALTER TABLE device_list ADD COLUMN reported_identity TEXT;
        ALTER TABLE device_list ADD COLUMN model TEXT;
        ALTER TABLE device_list ADD COLUMN last_seen TEXT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_device_list_reported_identity
            ON device_list(reported_identity);
        CREATE INDEX IF NOT EXISTS idx_device_list_address
            ON device_list(address);
        ",
    )?;
    Ok(())
}
