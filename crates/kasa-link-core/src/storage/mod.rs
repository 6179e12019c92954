//! Persistent device registry.

pub mod migrations;
pub mod registry;

pub use registry::RegistryStore;

/// File name of the registry database inside the data directory.
pub const REGISTRY_FILE: &str = "registry.db";

/// Get the default data directory for Kasa-Link tools.
///
/// Uses the `directories` crate to find the appropriate platform-specific
/// data directory.
pub fn default_data_dir() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "kasa-link", "kasa-link")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default registry location: `<data dir>/registry.db`.
pub fn default_store_path() -> Option<std::path::PathBuf> {
    default_data_dir().map(|dir| dir.join(REGISTRY_FILE))
}
