//! Table-formatted output for CLI.

use chrono::{DateTime, Local, Utc};
use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use kasa_link_core::{DeviceRecord, DeviceStatus, Outcome, PowerCommand, SweepReport};

use super::OutputFormatter;

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }

    fn status_cell(status: DeviceStatus) -> Cell {
        let color = match status {
            DeviceStatus::Online => Color::Green,
            DeviceStatus::Offline => Color::Red,
            DeviceStatus::Unknown => Color::Yellow,
        };
        Cell::new(status.as_str()).fg(color)
    }

    fn status_text(status: DeviceStatus) -> ColoredString {
        match status {
            DeviceStatus::Online => status.as_str().green(),
            DeviceStatus::Offline => status.as_str().red(),
            DeviceStatus::Unknown => status.as_str().yellow(),
        }
    }

    fn seen(last_seen: Option<DateTime<Utc>>) -> String {
        last_seen
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string())
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TableOutput {
    fn format_devices(&self, devices: &[DeviceRecord]) -> String {
        if devices.is_empty() {
            return "No devices registered.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Name", "Address", "ID", "Status", "Last Seen"]);

        for device in devices {
            table.add_row(vec![
                Cell::new(&device.name),
                Cell::new(device.address),
                Cell::new(device.id),
                Self::status_cell(device.status),
                Cell::new(Self::seen(device.last_seen)),
            ]);
        }

        format!("{}\n\n{} device(s)", table, devices.len())
    }

    fn format_device(&self, device: &DeviceRecord) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Device: {} (#{})", device.name.bold(), device.id));
        lines.push(format!("  Address:    {}", device.address));
        lines.push(format!("  Status:     {}", Self::status_text(device.status)));
        lines.push(format!("  Last Seen:  {}", Self::seen(device.last_seen)));
        if let Some(hw) = &device.reported_identity {
            lines.push(format!("  Hardware:   {}", hw));
        }
        if let Some(model) = &device.model {
            lines.push(format!("  Model:      {}", model));
        }
        lines.push(format!(
            "  Registered: {}",
            device.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ));

        lines.join("\n")
    }

    fn format_record_change(&self, action: &str, device: &DeviceRecord) -> String {
        format!(
            "{} {} '{}' (#{}, {})",
            "[OK]".green(),
            action,
            device.name,
            device.id,
            device.address
        )
    }

    fn format_command_result(&self, outcome: &Outcome) -> String {
        let relay = match outcome.ack.relay_on {
            Some(true) => "on".green(),
            Some(false) => "off".red(),
            None => "unknown".yellow(),
        };
        let verb = match outcome.ack.command {
            PowerCommand::PowerOn => "switched on",
            PowerCommand::PowerOff => "switched off",
            PowerCommand::Refresh => "refreshed",
        };

        format!(
            "{} '{}' ({}) {}\n  Relay:  {}\n  Status: {}",
            "[OK]".green(),
            outcome.record.name,
            outcome.ack.address,
            verb,
            relay,
            Self::status_text(outcome.record.status)
        )
    }

    fn format_sweep_report(&self, report: &SweepReport) -> String {
        let mut sections = Vec::new();

        if !report.updated.is_empty() {
            sections.push(format!("Seen:\n{}", self.format_devices(&report.updated)));
        }

        if !report.unregistered.is_empty() {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Address", "Hardware ID", "Alias", "Model"]);
            for obs in &report.unregistered {
                table.add_row(vec![
                    Cell::new(obs.address),
                    Cell::new(&obs.reported_identity),
                    Cell::new(obs.alias.as_deref().unwrap_or("-")),
                    Cell::new(obs.model.as_deref().unwrap_or("-")),
                ]);
            }
            sections.push(format!(
                "Unregistered (use `kasa-link register <name> <address>`):\n{}",
                table
            ));
        }

        if !report.offline.is_empty() {
            let names: Vec<String> = report
                .offline
                .iter()
                .map(|d| format!("  {} ({})", d.name, d.address))
                .collect();
            sections.push(format!("{}\n{}", "Now offline:".red(), names.join("\n")));
        }

        for anomaly in &report.anomalies {
            sections.push(format!(
                "{} {} answered from {} and {}; kept {}",
                "[!]".yellow(),
                anomaly.reported_identity,
                anomaly.kept,
                anomaly.discarded,
                anomaly.kept
            ));
        }

        sections.push(format!(
            "Sweep of {}: {} updated, {} unregistered, {} now offline",
            report.target,
            report.updated.len().to_string().green(),
            report.unregistered.len().to_string().yellow(),
            report.offline.len().to_string().red()
        ));

        sections.join("\n\n")
    }

    fn format_version(&self, version: &str) -> String {
        format!("kasa-link {}", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasa_link_core::DeviceId;

    fn record(status: DeviceStatus) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId(1),
            name: "lamp".to_string(),
            address: "10.0.0.5".parse().unwrap(),
            reported_identity: None,
            model: None,
            last_seen: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_list_contains_columns() {
        colored::control::set_override(false);
        let out = TableOutput::new().format_devices(&[record(DeviceStatus::Unknown)]);
        assert!(out.contains("lamp"));
        assert!(out.contains("10.0.0.5"));
        assert!(out.contains("unknown"));
        assert!(out.contains("1 device(s)"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(
            TableOutput::new().format_devices(&[]),
            "No devices registered."
        );
    }

    #[test]
    fn test_sweep_summary_counts() {
        colored::control::set_override(false);
        let report = SweepReport {
            target: "255.255.255.255".to_string(),
            observed: 1,
            updated: vec![record(DeviceStatus::Online)],
            unregistered: Vec::new(),
            offline: Vec::new(),
            anomalies: Vec::new(),
        };
        let out = TableOutput::new().format_sweep_report(&report);
        assert!(out.contains("1 updated, 0 unregistered, 0 now offline"));
    }
}
