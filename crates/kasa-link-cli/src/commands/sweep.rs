//! Sweep command implementation.

use std::time::Duration;

use kasa_link_core::{Dispatcher, Settings, SweepTarget};

use crate::cli::SweepArgs;
use crate::commands::spinner;
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the sweep command
pub async fn run_sweep(
    dispatcher: &Dispatcher,
    settings: &Settings,
    args: SweepArgs,
    json: bool,
) -> Result<(), CliError> {
    let target: SweepTarget = match &args.target {
        Some(target) => target.parse()?,
        None => settings.sweep_target()?,
    };
    let window = match args.window {
        Some(0) => {
            return Err(CliError::InvalidArgument(
                "--window must be greater than zero".to_string(),
            ))
        }
        Some(ms) => Duration::from_millis(ms),
        None => settings.timeout(),
    };

    let pb = spinner(
        format!("Sweeping {} for {:.1}s", target, window.as_secs_f64()),
        json,
    );
    let result = dispatcher.sweep(target, window).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = result?;
    println!("{}", get_formatter(json).format_sweep_report(&report));
    Ok(())
}
