use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{GreenworksError, GreenworksResult};
use crate::models::{RawDevice, RawOperatingStatus, RawProperties};

/// Authoritative identity of a device.
///
/// Resolved once, in priority order: serial number, cloud id, display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeviceIdentity {
    Serial(String),
    Id(u64),
    Name(String),
}

impl DeviceIdentity {
    /// True when the identity comes from the vendor (serial or id), and not
    /// from the user-editable display name.
    #[must_use]
    pub const fn is_hardware(&self) -> bool {
        matches!(self, Self::Serial(_) | Self::Id(_))
    }
}

impl Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(sn) => write!(f, "{sn}"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OperatingStatus {
    /// Integer vendor state code, when reported
    pub code: Option<i64>,
    /// Free-text state, only kept when no integer code is available
    pub text: Option<String>,
    /// Battery percentage, 0..=100
    pub battery: Option<u8>,
    pub next_start: Option<DateTime<Utc>>,
    pub request_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeviceProperties {
    pub frost_sensor: Option<bool>,
    pub rain_sensor: Option<bool>,
    pub blade_usage: Option<String>,
    pub geofence: Option<Geofence>,
}

/// Vendor-reported device state at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub id: Option<u64>,
    pub serial: Option<String>,
    pub product_id: Option<String>,
    pub display_name: String,
    pub model: Option<String>,
    pub online: bool,
    pub operating_status: OperatingStatus,
    pub properties: DeviceProperties,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
}

#[allow(clippy::cast_possible_truncation)]
fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num
            .as_i64()
            .or_else(|| num.as_f64().map(|x| x.round() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(Some(text.clone())),
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn epoch_to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    // the cloud reports 0 for "nothing scheduled"
    const MILLIS_THRESHOLD: i64 = 10_000_000_000;

    match epoch {
        ..=0 => None,
        x if x >= MILLIS_THRESHOLD => DateTime::from_timestamp_millis(x),
        x => DateTime::from_timestamp(x, 0),
    }
}

fn value_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(epoch) = value_to_i64(value) {
        return epoch_to_datetime(epoch);
    }

    let text = value.as_str()?.trim();
    match DateTime::parse_from_rfc3339(text) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(err) => {
            log::debug!("Ignoring unparseable timestamp {text:?}: {err}");
            None
        }
    }
}

/// Vendor names for the integer state codes, as sent by firmware that reports
/// `mower_main_state` symbolically.
const STATE_NAMES: &[(&str, i64)] = &[
    ("STOP_BUTTON_PRESSED", 1),
    ("PARKED_BY_USER", 2),
    ("PAUSED", 3),
    ("MOWING", 4),
    ("LEAVING_CHARGING_STATION", 5),
    ("SEARCHING_FOR_CHARGING_STATION", 6),
    ("CHARGING", 7),
];

/// Integer state code for a symbolic vendor state name
#[must_use]
pub fn state_code(name: &str) -> Option<i64> {
    let name = name.trim().to_uppercase().replace([' ', '-'], "_");
    STATE_NAMES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, code)| *code)
}

fn parse_battery(value: &Value) -> Option<u8> {
    // -1 means "unknown"
    value_to_i64(value).and_then(|x| u8::try_from(x).ok().filter(|x| *x <= 100))
}

impl OperatingStatus {
    fn from_wire(raw: Option<&RawOperatingStatus>, device_status: Option<String>) -> Self {
        let mut res = Self::default();

        if let Some(raw) = raw {
            if let Some(state) = &raw.mower_main_state {
                let name = state.as_str();
                match value_to_i64(state).or_else(|| name.and_then(state_code)) {
                    Some(code) => res.code = Some(code),
                    None => res.text = non_empty(name.map(str::to_string)),
                }
            }
            res.battery = raw.battery_status.as_ref().and_then(parse_battery);
            res.next_start = raw.next_start.as_ref().and_then(value_to_datetime);
            res.request_time = raw.request_time.as_ref().and_then(value_to_datetime);
        }

        if res.code.is_none() && res.text.is_none() {
            match device_status.as_deref().and_then(state_code) {
                Some(code) => res.code = Some(code),
                None => res.text = non_empty(device_status),
            }
        }

        res
    }
}

impl DeviceProperties {
    fn from_wire(raw: &RawProperties) -> Self {
        let geofence = match (raw.latitude, raw.longitude) {
            (Some(latitude), Some(longitude)) => Some(Geofence {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Self {
            frost_sensor: raw.is_frost_sensor_on,
            rain_sensor: raw.is_rain_sensor_on,
            blade_usage: raw
                .device_blade_usage_time
                .as_ref()
                .and_then(value_to_string),
            geofence,
        }
    }
}

impl DeviceRecord {
    /// Build a record from the device listing entry and its property document.
    ///
    /// This is the only place vendor documents are interpreted.
    pub fn from_wire(raw: RawDevice, props: &RawProperties) -> GreenworksResult<Self> {
        let serial = non_empty(raw.sn);
        let name = non_empty(raw.name);

        let identity = if let Some(sn) = &serial {
            DeviceIdentity::Serial(sn.clone())
        } else if let Some(id) = raw.id {
            DeviceIdentity::Id(id)
        } else if let Some(name) = &name {
            DeviceIdentity::Name(name.clone())
        } else {
            return Err(GreenworksError::malformed(
                "device has neither serial number, id nor name",
            ));
        };

        let display_name = name.unwrap_or_else(|| identity.to_string());

        Ok(Self {
            operating_status: OperatingStatus::from_wire(
                props.operating_status.as_ref(),
                raw.status,
            ),
            properties: DeviceProperties::from_wire(props),
            id: raw.id,
            serial,
            product_id: raw.product_id.as_ref().and_then(value_to_string),
            display_name,
            model: non_empty(raw.model),
            online: raw.is_online.unwrap_or(false),
            identity,
        })
    }
}
