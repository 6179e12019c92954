//! Output formatting for CLI results.

pub mod json;
pub mod table;

pub use json::JsonOutput;
pub use table::TableOutput;

use kasa_link_core::{DeviceRecord, Outcome, SweepReport};

/// Output formatter trait
pub trait OutputFormatter {
    /// Format a page of registry records
    fn format_devices(&self, devices: &[DeviceRecord]) -> String;

    /// Format one registry record
    fn format_device(&self, device: &DeviceRecord) -> String;

    /// Format a registry change such as a registration or removal
    fn format_record_change(&self, action: &str, device: &DeviceRecord) -> String;

    /// Format an acknowledged command
    fn format_command_result(&self, outcome: &Outcome) -> String;

    /// Format the summary of a sweep
    fn format_sweep_report(&self, report: &SweepReport) -> String;

    /// Format the version string
    fn format_version(&self, version: &str) -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}
