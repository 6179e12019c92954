//! Command implementations.

pub mod power;
pub mod registry;
pub mod sweep;
pub mod version;

pub use power::run_power;
pub use registry::{run_list, run_register, run_remove, run_show};
pub use sweep::run_sweep;
pub use version::run_version;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use kasa_link_core::{Dispatcher, KasaTransport, RegistryStore, Settings};
use tracing::debug;

use crate::error::CliError;

/// Open the registry and wire the dispatcher for one invocation.
pub fn open_dispatcher(settings: &Settings) -> Result<Dispatcher, CliError> {
    let path = settings.resolved_store_path()?;
    debug!(path = %path.display(), "Opening registry");

    let store = Arc::new(RegistryStore::open(&path)?);
    let transport = Arc::new(KasaTransport::from_settings(settings));
    Ok(Dispatcher::new(store, transport))
}

/// Spinner on stderr while a network call runs. Suppressed under `--json`.
pub(crate) fn spinner(message: String, json: bool) -> Option<ProgressBar> {
    if json {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}
