//! Request builders for the plug protocol.
//!
//! Requests are JSON objects keyed by module then method. Several methods of
//! one module may be batched in a single request; the reply mirrors the shape.

use serde_json::json;

use crate::types::PowerCommand;

/// Module holding system information and relay control
pub const SYSTEM_MODULE: &str = "system";

pub const GET_SYSINFO: &str = "get_sysinfo";

pub const SET_RELAY_STATE: &str = "set_relay_state";

/// Request builders for device protocol
pub struct Commands;

impl Commands {
    /// Query system information (identity, alias, relay state).
    pub fn get_sysinfo() -> String {
        json!({ SYSTEM_MODULE: { GET_SYSINFO: {} } }).to_string()
    }

    /// Switch the relay and read back sysinfo in the same round trip.
    pub fn set_relay_state(on: bool) -> String {
        json!({
            SYSTEM_MODULE: {
                SET_RELAY_STATE: { "state": u8::from(on) },
                GET_SYSINFO: {}
            }
        })
        .to_string()
    }

    /// Request for a dispatcher-level command.
    pub fn for_command(command: PowerCommand) -> String {
        match command {
            PowerCommand::PowerOn => Self::set_relay_state(true),
            PowerCommand::PowerOff => Self::set_relay_state(false),
            PowerCommand::Refresh => Self::get_sysinfo(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_sysinfo() {
        assert_eq!(Commands::get_sysinfo(), r#"{"system":{"get_sysinfo":{}}}"#);
    }

    #[test]
    fn test_set_relay_state_batches_sysinfo() {
        let value: serde_json::Value =
            serde_json::from_str(&Commands::set_relay_state(true)).unwrap();
        assert_eq!(value["system"]["set_relay_state"]["state"], 1);
        assert!(value["system"]["get_sysinfo"].is_object());

        let value: serde_json::Value =
            serde_json::from_str(&Commands::set_relay_state(false)).unwrap();
        assert_eq!(value["system"]["set_relay_state"]["state"], 0);
    }

    #[test]
    fn test_refresh_is_read_only() {
        let request = Commands::for_command(PowerCommand::Refresh);
        assert!(!request.contains(SET_RELAY_STATE));
    }
}
