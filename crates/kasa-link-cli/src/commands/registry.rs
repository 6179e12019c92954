//! Registry commands: register, list, show, remove.

use kasa_link_core::{Dispatcher, Identity};

use crate::cli::{ListArgs, RegisterArgs, TargetArgs};
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the register command
pub fn run_register(dispatcher: &Dispatcher, args: RegisterArgs, json: bool) -> Result<(), CliError> {
    let record = dispatcher.register(&args.name, &args.address)?;
    println!("{}", get_formatter(json).format_record_change("registered", &record));
    Ok(())
}

/// Run the list command
pub fn run_list(dispatcher: &Dispatcher, args: ListArgs, json: bool) -> Result<(), CliError> {
    let devices = dispatcher.list(args.skip, args.limit)?;
    println!("{}", get_formatter(json).format_devices(&devices));
    Ok(())
}

/// Run the show command
pub fn run_show(dispatcher: &Dispatcher, args: TargetArgs, json: bool) -> Result<(), CliError> {
    let record = dispatcher.show(&Identity::parse(&args.device))?;
    println!("{}", get_formatter(json).format_device(&record));
    Ok(())
}

/// Run the remove command
pub async fn run_remove(dispatcher: &Dispatcher, args: TargetArgs, json: bool) -> Result<(), CliError> {
    let record = dispatcher.remove(&Identity::parse(&args.device)).await?;
    println!("{}", get_formatter(json).format_record_change("removed", &record));
    Ok(())
}
