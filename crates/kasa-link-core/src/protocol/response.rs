//! Response parsing utilities for device protocol.

use serde::Deserialize;
use serde_json::Value;

use super::commands::{GET_SYSINFO, SET_RELAY_STATE, SYSTEM_MODULE};
use crate::error::DeviceError;

/// Fields of a `get_sysinfo` reply that the registry cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SysInfo {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub relay_state: Option<u8>,
}

impl SysInfo {
    pub fn relay_on(&self) -> Option<bool> {
        self.relay_state.map(|state| state != 0)
    }
}

/// Parse reply text into JSON, tolerating leading noise before the object.
pub fn parse_json_response(response: &str, target: &str) -> Result<Value, DeviceError> {
    let json_start = response
        .find('{')
        .ok_or_else(|| DeviceError::InvalidResponse {
            target: target.to_string(),
            message: "No JSON found in response".to_string(),
        })?;

    serde_json::from_str(&response[json_start..]).map_err(|e| DeviceError::InvalidResponse {
        target: target.to_string(),
        message: format!("Failed to parse JSON: {}", e),
    })
}

/// Check for an error code in a method reply.
///
/// Returns the error message if the device reported a non-zero `err_code`.
pub fn is_error_response(method_reply: &Value) -> Option<String> {
    let code = method_reply.get("err_code")?.as_i64()?;
    if code == 0 {
        return None;
    }
    let msg = method_reply
        .get("err_msg")
        .and_then(Value::as_str)
        .unwrap_or("device reported an error");
    Some(format!("{} (err_code {})", msg, code))
}

fn method_reply<'a>(reply: &'a Value, method: &str, target: &str) -> Result<&'a Value, DeviceError> {
    reply
        .get(SYSTEM_MODULE)
        .and_then(|module| module.get(method))
        .ok_or_else(|| DeviceError::InvalidResponse {
            target: target.to_string(),
            message: format!("Reply has no {}.{} section", SYSTEM_MODULE, method),
        })
}

/// Extract sysinfo, surfacing a device-side error as `Rejected`.
pub fn parse_sysinfo(reply: &Value, target: &str) -> Result<SysInfo, DeviceError> {
    let section = method_reply(reply, GET_SYSINFO, target)?;
    if let Some(message) = is_error_response(section) {
        return Err(DeviceError::Rejected {
            target: target.to_string(),
            message,
        });
    }
    SysInfo::deserialize(section).map_err(|e| DeviceError::InvalidResponse {
        target: target.to_string(),
        message: format!("Malformed sysinfo: {}", e),
    })
}

/// Verify a relay switch reply.
pub fn check_relay_reply(reply: &Value, target: &str) -> Result<(), DeviceError> {
    let section = method_reply(reply, SET_RELAY_STATE, target)?;
    match is_error_response(section) {
        Some(message) => Err(DeviceError::Rejected {
            target: target.to_string(),
            message,
        }),
        None => Ok(()),
    }
}
