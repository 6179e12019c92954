//! Power commands: power-on, power-off, refresh.

use kasa_link_core::{Dispatcher, Identity, PowerCommand};

use crate::cli::TargetArgs;
use crate::commands::spinner;
use crate::error::CliError;
use crate::output::get_formatter;

/// Resolve the target and send `command` to it
pub async fn run_power(
    dispatcher: &Dispatcher,
    args: TargetArgs,
    command: PowerCommand,
    json: bool,
) -> Result<(), CliError> {
    let identity = Identity::parse(&args.device);
    let pb = spinner(format!("{} {}", command, identity), json);

    let result = dispatcher.execute(&identity, command).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let outcome = result?;
    println!("{}", get_formatter(json).format_command_result(&outcome));
    Ok(())
}
