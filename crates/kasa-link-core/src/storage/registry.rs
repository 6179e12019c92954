//! Registry store: durable name -> address mapping on SQLite.
//!
//! One connection behind a mutex. Every write runs in its own transaction,
//! so concurrent readers never see a half-applied update.

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::migrations;
use crate::error::StorageError;
use crate::types::{DeviceId, DeviceRecord, DeviceStatus, Identity, RecordUpdate};

/// Letters, digits, space, dot, dash and underscore
const NAME_PATTERN: &str = r"^[A-Za-z0-9 ._-]+$";

/// Maximum name length
const MAX_NAME_LENGTH: usize = 64;

const COLUMNS: &str =
    "id, name, address, reported_identity, model, last_seen, status, created_at";

pub struct RegistryStore {
    conn: Mutex<Connection>,
    name_regex: Regex,
}

/// Row as stored, before address/timestamp parsing.
struct RawRecord {
    id: i64,
    name: String,
    address: String,
    reported_identity: Option<String>,
    model: Option<String>,
    last_seen: Option<String>,
    status: String,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            address: row.get(2)?,
            reported_identity: row.get(3)?,
            model: row.get(4)?,
            last_seen: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<DeviceRecord, StorageError> {
        let id = self.id;
        let corrupt = |message: String| StorageError::Corrupt { id, message };

        let address = self
            .address
            .parse::<IpAddr>()
            .map_err(|_| corrupt(format!("bad address '{}'", self.address)))?;
        let status = DeviceStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("bad status '{}'", self.status)))?;
        let last_seen = self
            .last_seen
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt(format!("bad last_seen: {}", e)))?;
        let created_at =
            parse_timestamp(&self.created_at).map_err(|e| corrupt(format!("bad created_at: {}", e)))?;

        Ok(DeviceRecord {
            id: DeviceId(self.id),
            name: self.name,
            address,
            reported_identity: self.reported_identity,
            model: self.model,
            last_seen,
            status,
            created_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn query_one(
    conn: &Connection,
    clause: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<DeviceRecord>, StorageError> {
    let sql = format!("SELECT {} FROM device_list WHERE {}", COLUMNS, clause);
    conn.query_row(&sql, [param], RawRecord::from_row)
        .optional()?
        .map(RawRecord::into_record)
        .transpose()
}

impl RegistryStore {
    /// Open (creating if needed) the registry at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        debug!(path = %path.display(), "Opened registry");

        Self::with_connection(conn)
    }

    /// Open an in-memory registry for testing.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::run_migrations(&conn)?;
        let name_regex = Regex::new(NAME_PATTERN)
            .map_err(|e| StorageError::InvalidName(format!("name pattern: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            name_regex,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_name(&self, name: &str) -> Result<(), StorageError> {
        if name.trim().is_empty() {
            return Err(StorageError::InvalidName(
                "Name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_NAME_LENGTH {
            return Err(StorageError::InvalidName(format!(
                "Name exceeds maximum length of {} characters",
                MAX_NAME_LENGTH
            )));
        }

        if !self.name_regex.is_match(name) {
            return Err(StorageError::InvalidName(format!(
                "Name '{}' contains invalid characters. Only letters, digits, space, dot, dash and underscore allowed.",
                name
            )));
        }

        if name.chars().all(|c| c.is_ascii_digit()) {
            return Err(StorageError::InvalidName(format!(
                "Name '{}' is purely numeric and would be read as an id",
                name
            )));
        }

        Ok(())
    }

    /// Register a new device with status `unknown`.
    pub fn create(&self, name: &str, address: IpAddr) -> Result<DeviceRecord, StorageError> {
        self.validate_name(name)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        if query_one(&tx, "name = ?1", &name)?.is_some() {
            return Err(StorageError::DuplicateName(name.to_string()));
        }

        tx.execute(
            "INSERT INTO device_list (name, address, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                address.to_string(),
                DeviceStatus::Unknown.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = tx.last_insert_rowid();
        let record = query_one(&tx, "id = ?1", &id)?
            .ok_or_else(|| StorageError::NotFound(format!("#{} after insert", id)))?;
        tx.commit()?;

        info!(id, name, %address, "Registered device");
        Ok(record)
    }

    pub fn get_by_name(&self, name: &str) -> Result<DeviceRecord, StorageError> {
        query_one(&self.lock(), "name = ?1", &name)?
            .ok_or_else(|| StorageError::NotFound(format!("'{}'", name)))
    }

    pub fn get_by_id(&self, id: DeviceId) -> Result<DeviceRecord, StorageError> {
        query_one(&self.lock(), "id = ?1", &id.0)?
            .ok_or_else(|| StorageError::NotFound(format!("#{}", id)))
    }

    /// Look up by id or name, whichever the identity carries.
    pub fn resolve(&self, identity: &Identity) -> Result<DeviceRecord, StorageError> {
        match identity {
            Identity::Id(id) => self.get_by_id(*id),
            Identity::Name(name) => self.get_by_name(name),
        }
    }

    pub fn find_by_reported_identity(
        &self,
        reported_identity: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        query_one(&self.lock(), "reported_identity = ?1", &reported_identity)
    }

    /// Page through records ordered by id ascending.
    pub fn list_all(&self, skip: usize, limit: usize) -> Result<Vec<DeviceRecord>, StorageError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM device_list ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);

        let raw = stmt
            .query_map(params![limit, skip], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawRecord::into_record).collect()
    }

    /// Every record, ordered by id. Input to a reconciliation pass.
    pub fn snapshot(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        self.list_all(0, usize::MAX)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM device_list", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Apply a partial update atomically and return the new row.
    pub fn update(&self, id: DeviceId, update: &RecordUpdate) -> Result<DeviceRecord, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let current = query_one(&tx, "id = ?1", &id.0)?
            .ok_or_else(|| StorageError::NotFound(format!("#{}", id)))?;

        if let Some(hw) = &update.reported_identity {
            if let Some(owner) = query_one(&tx, "reported_identity = ?1", hw)? {
                if owner.id != id {
                    return Err(StorageError::DuplicateIdentity {
                        identity: hw.clone(),
                        owner: owner.name,
                    });
                }
            }
        }

        if update.is_empty() {
            return Ok(current);
        }

        tx.execute(
            "UPDATE device_list SET
                address = COALESCE(?2, address),
                last_seen = COALESCE(?3, last_seen),
                status = COALESCE(?4, status),
                reported_identity = COALESCE(?5, reported_identity),
                model = COALESCE(?6, model)
             WHERE id = ?1",
            params![
                id.0,
                update.address.map(|a| a.to_string()),
                update.last_seen.map(|t| t.to_rfc3339()),
                update.status.map(|s| s.as_str()),
                update.reported_identity,
                update.model,
            ],
        )?;

        let record = query_one(&tx, "id = ?1", &id.0)?
            .ok_or_else(|| StorageError::NotFound(format!("#{}", id)))?;
        tx.commit()?;

        debug!(id = id.0, status = %record.status, address = %record.address, "Updated device");
        Ok(record)
    }

    /// Remove a record. Its id is never handed out again.
    pub fn delete(&self, id: DeviceId) -> Result<DeviceRecord, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let record = query_one(&tx, "id = ?1", &id.0)?
            .ok_or_else(|| StorageError::NotFound(format!("#{}", id)))?;
        tx.execute("DELETE FROM device_list WHERE id = ?1", params![id.0])?;
        tx.commit()?;

        info!(id = id.0, name = %record.name, "Removed device");
        Ok(record)
    }
}
