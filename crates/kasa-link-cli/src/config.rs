//! Layered configuration: defaults, TOML file, environment, then flags.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use kasa_link_core::Settings;
use tracing::debug;

use crate::cli::Cli;
use crate::error::CliError;

/// Environment variable prefix, e.g. `KASA_LINK_TIMEOUT=2000`.
pub const ENV_PREFIX: &str = "KASA_LINK_";

const CONFIG_FILE: &str = "config.toml";

/// `<platform config dir>/kasa-link/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "kasa-link", "kasa-link")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Defaults overlaid with the TOML file, if any.
fn file_layers(config_file: Option<&Path>) -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(Settings::default()));
    match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    }
}

/// Load settings for this invocation and validate them before any I/O.
pub fn load(cli: &Cli) -> Result<Settings, CliError> {
    let config_file = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(CliError::InvalidArgument(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Some(path) => Some(path.clone()),
        None => default_config_path(),
    };
    debug!(path = ?config_file, "Loading configuration");

    let mut settings: Settings = file_layers(config_file.as_deref())
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;

    apply_flags(&mut settings, cli.timeout, cli.store.as_deref());
    settings.validate()?;
    Ok(settings)
}

/// Explicit flags win over every other layer.
fn apply_flags(settings: &mut Settings, timeout: Option<u64>, store: Option<&Path>) {
    if let Some(timeout) = timeout {
        settings.timeout = timeout;
    }
    if let Some(store) = store {
        settings.store_path = Some(store.to_path_buf());
    }
}
