//! Runtime settings shared by the transport, registry and dispatcher.
//!
//! The CLI layers defaults, a TOML file and environment variables into this
//! struct; core only validates and consumes it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::SweepTarget;
use crate::error::ConfigError;

/// Default per-probe and per-command deadline.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default sweep target: limited broadcast.
pub const DEFAULT_SWEEP_TARGET: &str = "255.255.255.255";

/// Default device port (TCP commands and UDP discovery).
pub const DEFAULT_DEVICE_PORT: u16 = 9999;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-probe deadline in milliseconds.
    pub timeout: u64,
    /// Default broadcast address or CIDR for `sweep`.
    pub sweep_target: String,
    /// Registry database file. `None` means the platform data directory.
    pub store_path: Option<PathBuf>,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            sweep_target: DEFAULT_SWEEP_TARGET.to_string(),
            store_path: None,
            port: DEFAULT_DEVICE_PORT,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Check every option before any I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.sweep_target()?;
        Ok(())
    }

    pub fn sweep_target(&self) -> Result<SweepTarget, ConfigError> {
        self.sweep_target.parse()
    }

    /// Resolve the registry location, falling back to the data directory.
    pub fn resolved_store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => crate::storage::default_store_path().ok_or(ConfigError::NoDataDir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let settings = Settings {
            timeout: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_sweep_target_rejected() {
        let settings = Settings {
            sweep_target: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSweepTarget { .. })
        ));
    }

    #[test]
    fn test_explicit_store_path_wins() {
        let settings = Settings {
            store_path: Some(PathBuf::from("/tmp/registry.db")),
            ..Default::default()
        };
        assert_eq!(
            settings.resolved_store_path().unwrap(),
            PathBuf::from("/tmp/registry.db")
        );
    }
}
