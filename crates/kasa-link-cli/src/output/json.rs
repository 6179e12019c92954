//! JSON-formatted output for CLI.

use kasa_link_core::{DeviceRecord, Outcome, SweepReport};
use serde::Serialize;
use serde_json::json;

use super::OutputFormatter;

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_devices(&self, devices: &[DeviceRecord]) -> String {
        Self::to_json(&json!({
            "devices": devices,
            "count": devices.len()
        }))
    }

    fn format_device(&self, device: &DeviceRecord) -> String {
        Self::to_json(device)
    }

    fn format_record_change(&self, action: &str, device: &DeviceRecord) -> String {
        Self::to_json(&json!({
            "action": action,
            "device": device
        }))
    }

    fn format_command_result(&self, outcome: &Outcome) -> String {
        Self::to_json(&json!({
            "device": outcome.record,
            "ack": outcome.ack,
            "success": true
        }))
    }

    fn format_sweep_report(&self, report: &SweepReport) -> String {
        Self::to_json(&json!({
            "target": report.target,
            "observed": report.observed,
            "updated": report.updated,
            "unregistered": report.unregistered,
            "offline": report.offline,
            "anomalies": report.anomalies,
            "summary": {
                "updated": report.updated.len(),
                "unregistered": report.unregistered.len(),
                "offline": report.offline.len()
            }
        }))
    }

    fn format_version(&self, version: &str) -> String {
        Self::to_json(&json!({ "version": version }))
    }
}
