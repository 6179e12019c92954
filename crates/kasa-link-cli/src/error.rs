//! Error types for Kasa-Link CLI.
//!
//! CliError wraps CoreError from the shared library and adds CLI-specific variants.

use kasa_link_core::error::{CoreError, ErrorKind};
use thiserror::Error;

pub use kasa_link_core::error::{ConfigError, DeviceError, StorageError};

/// Exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const UNREACHABLE: i32 = 2;
    pub const DEVICE_ERROR: i32 = 3;
    pub const INVALID_ARGS: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const DUPLICATE_NAME: i32 = 6;
    pub const STORE_ERROR: i32 = 7;
}

/// Main error type for the CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<figment::Error> for CliError {
    fn from(e: figment::Error) -> Self {
        CliError::Config(Box::new(e))
    }
}

impl CliError {
    /// Label printed between brackets in the error line.
    pub fn kind_label(&self) -> &'static str {
        match self {
            CliError::Core(e) => e.kind().as_str(),
            CliError::Config(_) => "Config",
            CliError::Io(_) => "Io",
            CliError::InvalidArgument(_) => ErrorKind::InvalidInput.as_str(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) => match e.kind() {
                ErrorKind::Unreachable => exit_codes::UNREACHABLE,
                ErrorKind::DeviceError => exit_codes::DEVICE_ERROR,
                ErrorKind::InvalidInput => exit_codes::INVALID_ARGS,
                ErrorKind::NotFound => exit_codes::NOT_FOUND,
                ErrorKind::DuplicateName => exit_codes::DUPLICATE_NAME,
                ErrorKind::StoreError => exit_codes::STORE_ERROR,
            },
            CliError::Config(_) => exit_codes::GENERAL_ERROR,
            CliError::Io(_) => exit_codes::GENERAL_ERROR,
            CliError::InvalidArgument(_) => exit_codes::INVALID_ARGS,
        }
    }
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        CliError::Core(CoreError::Device(e))
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::Core(CoreError::Storage(e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Core(CoreError::Config(e))
    }
}
