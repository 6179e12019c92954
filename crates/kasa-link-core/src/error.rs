//! Error types for Kasa-Link core.

use serde::Serialize;
use thiserror::Error;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device transport errors.
///
/// `target` is the address the transport talked to; the dispatcher relabels
/// it with the logical name via [`DeviceError::with_identity`].
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} rejected the command: {message}")]
    Rejected { target: String, message: String },

    #[error("Invalid response from {target}: {message}")]
    InvalidResponse { target: String, message: String },

    /// Failed on this host before anything reached the wire (socket
    /// exhaustion, no route, sweep cut short). Says nothing about the device.
    #[error("{target}: local network failure: {reason}")]
    Local { target: String, reason: String },
}

impl DeviceError {
    pub fn unreachable(target: impl ToString, reason: impl ToString) -> Self {
        DeviceError::Unreachable {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn local(target: impl ToString, reason: impl ToString) -> Self {
        DeviceError::Local {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Prefix the target with the logical device name, e.g. `'lamp' (10.0.0.5)`.
    pub fn with_identity(self, name: &str) -> Self {
        let label = |target: String| format!("'{}' ({})", name, target);
        match self {
            DeviceError::Unreachable { target, reason } => DeviceError::Unreachable {
                target: label(target),
                reason,
            },
            DeviceError::Rejected { target, message } => DeviceError::Rejected {
                target: label(target),
                message,
            },
            DeviceError::InvalidResponse { target, message } => DeviceError::InvalidResponse {
                target: label(target),
                message,
            },
            DeviceError::Local { target, reason } => DeviceError::Local {
                target: label(target),
                reason,
            },
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeviceError::Unreachable { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, DeviceError::Local { .. })
    }
}

/// Registry storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("A device named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Hardware id {identity} is already bound to '{owner}'")]
    DuplicateIdentity { identity: String, owner: String },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Corrupt registry row {id}: {message}")]
    Corrupt { id: i64, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid sweep target '{target}': {reason}")]
    InvalidSweepTarget { target: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No data directory available; set store_path explicitly")]
    NoDataDir,
}

/// Failure taxonomy surfaced to callers.
///
/// Every error reaching the dispatcher boundary maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    DuplicateName,
    Unreachable,
    DeviceError,
    StoreError,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::Unreachable => "Unreachable",
            ErrorKind::DeviceError => "DeviceError",
            ErrorKind::StoreError => "StoreError",
            ErrorKind::InvalidInput => "InvalidInput",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Device(DeviceError::Unreachable { .. } | DeviceError::Local { .. }) => {
                ErrorKind::Unreachable
            }
            CoreError::Device(_) => ErrorKind::DeviceError,
            CoreError::Storage(e) => match e {
                StorageError::NotFound(_) => ErrorKind::NotFound,
                StorageError::DuplicateName(_) => ErrorKind::DuplicateName,
                StorageError::InvalidName(_) => ErrorKind::InvalidInput,
                StorageError::DuplicateIdentity { .. }
                | StorageError::Corrupt { .. }
                | StorageError::Sqlite(_)
                | StorageError::Io(_) => ErrorKind::StoreError,
            },
            CoreError::Config(_) => ErrorKind::InvalidInput,
            CoreError::Io(_) => ErrorKind::StoreError,
        }
    }
}
