//! JSON shapes of the LoRa App Server REST API (only the fields we touch).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text the server uses for a missing device or key set.
pub(crate) const OBJECT_DOES_NOT_EXIST: &str = "object does not exist";
/// gRPC status NOT_FOUND, echoed in the `code` field of error payloads.
const GRPC_NOT_FOUND: i64 = 5;

#[derive(Serialize)]
pub(crate) struct LoginBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct LoginResponse {
    pub jwt: String,
}

#[derive(Deserialize)]
pub(crate) struct DeviceResponse {
    pub device: DeviceWire,
}

#[derive(Deserialize)]
pub(crate) struct DeviceWire {
    #[serde(default)]
    pub name: Option<String>,
    /// Sent as a string by grpc-gateway (int64), tolerated as a number.
    #[serde(rename = "applicationID", default)]
    pub application_id: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct KeysResponse {
    #[serde(rename = "deviceKeys")]
    pub device_keys: DeviceKeysWire,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct DeviceKeysWire {
    #[serde(rename = "devEUI", default)]
    pub dev_eui: String,
    #[serde(rename = "nwkKey", default, skip_serializing_if = "Option::is_none")]
    pub nwk_key: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct DeviceKeysBody {
    #[serde(rename = "deviceKeys")]
    pub device_keys: DeviceKeysWire,
}

#[derive(Serialize)]
pub(crate) struct CreateDeviceBody<'a> {
    pub device: DeviceBody<'a>,
}

#[derive(Serialize)]
pub(crate) struct DeviceBody<'a> {
    #[serde(rename = "applicationID")]
    pub application_id: i64,
    pub description: &'a str,
    #[serde(rename = "devEUI")]
    pub dev_eui: &'a str,
    #[serde(rename = "deviceProfileID")]
    pub device_profile_id: &'a str,
    pub name: String,
}

/// Error text from an error payload (`error`, else `message`).
pub(crate) fn error_message(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Null) | Some(Value::String(_)) | None => {}
        Some(other) => return Some(other.to_string()),
    }
    match body.get("message") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn is_not_found(body: &Value) -> bool {
    let Some(msg) = error_message(body) else {
        return false;
    };
    msg == OBJECT_DOES_NOT_EXIST
        || body.get("code").and_then(Value::as_i64) == Some(GRPC_NOT_FOUND)
}

/// Registry display name for a new device: characters 9..16 of the devEUI
/// (the serial part of a 16-digit EUI). Short EUIs use the whole value.
pub(crate) fn device_name(dev_eui: &str) -> String {
    let name: String = dev_eui.chars().skip(9).take(7).collect();
    if name.is_empty() {
        dev_eui.to_string()
    } else {
        name
    }
}
