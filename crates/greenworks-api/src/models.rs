//! Wire representation of the GreenWorks cloud documents.
//!
//! Every field the cloud has been seen to omit is optional here. These types
//! are never handed to consumers directly: [`crate::device::DeviceRecord`] is
//! built from them in a single parsing step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub corp_id: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub timezone: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: u64,
    #[serde(default)]
    pub expire_in: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawDevice {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sn: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    /// Free-text status reported by some firmware generations
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawOperatingStatus {
    /// Either an integer state code or its symbolic name
    #[serde(default)]
    pub mower_main_state: Option<Value>,
    #[serde(default)]
    pub battery_status: Option<Value>,
    #[serde(default)]
    pub next_start: Option<Value>,
    #[serde(default)]
    pub request_time: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawProperties {
    #[serde(default)]
    pub operating_status: Option<RawOperatingStatus>,
    #[serde(default)]
    pub is_frost_sensor_on: Option<bool>,
    #[serde(default)]
    pub is_rain_sensor_on: Option<bool>,
    #[serde(default)]
    pub device_blade_usage_time: Option<Value>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommandRequest<'a> {
    pub operation: &'a str,
}
