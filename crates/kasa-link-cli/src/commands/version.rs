//! Version command implementation.

use crate::error::CliError;
use crate::output::get_formatter;

/// Print the crate version
pub fn run_version(json: bool) -> Result<(), CliError> {
    println!("{}", get_formatter(json).format_version(env!("CARGO_PKG_VERSION")));
    Ok(())
}
