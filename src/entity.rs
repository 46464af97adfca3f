//! Host-facing entities for one configured mower.
//!
//! Every entity is a pure projection of a [`MowerView`]: nothing here is
//! stored between polls.

use serde::Serialize;
use serde_json::Value;

use crate::reconcile::{Attributes, ConfiguredDevice, MowerView};

pub const DOMAIN: &str = "greenworks";
pub const MANUFACTURER: &str = "GreenWorks";
pub const DEFAULT_MODEL: &str = "GreenWorks Mower";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    LawnMower,
    Sensor,
    BinarySensor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MowerFeature {
    StartMowing,
    Pause,
    Dock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityState {
    pub platform: Platform,
    pub unique_id: String,
    pub name: String,
    pub available: bool,
    pub state: Value,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_features: Vec<MowerFeature>,
    pub device: DeviceInfo,
}

struct EntityFactory<'a> {
    device: &'a ConfiguredDevice,
    view: &'a MowerView,
    uid: String,
    info: DeviceInfo,
}

impl<'a> EntityFactory<'a> {
    fn new(device: &'a ConfiguredDevice, view: &'a MowerView) -> Self {
        let uid = device
            .hardware_id()
            .unwrap_or_else(|| device.display_name().to_string());

        let model = view
            .record
            .as_ref()
            .and_then(|rec| rec.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let info = DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), uid.clone())],
            manufacturer: MANUFACTURER.to_string(),
            model,
            name: device.display_name().to_string(),
        };

        Self {
            device,
            view,
            uid,
            info,
        }
    }

    fn entity(
        &self,
        platform: Platform,
        unique_id: String,
        name: String,
        state: Value,
    ) -> EntityState {
        EntityState {
            platform,
            unique_id,
            name,
            available: self.view.available,
            state,
            attributes: Attributes::new(),
            device_class: None,
            state_class: None,
            unit_of_measurement: None,
            icon: None,
            supported_features: vec![],
            device: self.info.clone(),
        }
    }

    fn sensor(&self, suffix: &str, label: &str, state: Value) -> EntityState {
        self.entity(
            Platform::Sensor,
            format!("{}_{suffix}", self.uid),
            format!("{} {label}", self.device.display_name()),
            state,
        )
    }

    fn binary_sensor(&self, suffix: &str, label: &str, state: Option<bool>) -> EntityState {
        self.entity(
            Platform::BinarySensor,
            format!("{}_{suffix}", self.uid),
            format!("{} {label}", self.device.display_name()),
            state.map_or(Value::Null, Value::from),
        )
    }

    fn lawn_mower(&self) -> EntityState {
        let unique_id = self
            .device
            .hardware_id()
            .unwrap_or_else(|| format!("{DOMAIN}_{}", self.device.display_name()));

        let state = self
            .view
            .activity
            .map_or(Value::Null, |act| Value::from(act.as_str()));

        EntityState {
            attributes: self.view.attributes.clone(),
            supported_features: vec![
                MowerFeature::StartMowing,
                MowerFeature::Pause,
                MowerFeature::Dock,
            ],
            ..self.entity(
                Platform::LawnMower,
                unique_id,
                self.device.display_name().to_string(),
                state,
            )
        }
    }

    fn battery(&self) -> EntityState {
        let value = self
            .view
            .record
            .as_ref()
            .and_then(|rec| rec.operating_status.battery)
            .map_or(Value::Null, Value::from);

        EntityState {
            device_class: Some("battery"),
            state_class: Some("measurement"),
            unit_of_measurement: Some("%"),
            ..self.sensor("battery", "Battery", value)
        }
    }

    fn next_start(&self) -> EntityState {
        let value = self
            .view
            .record
            .as_ref()
            .and_then(|rec| rec.operating_status.next_start)
            .map_or(Value::Null, |ts| Value::from(ts.to_rfc3339()));

        EntityState {
            device_class: Some("timestamp"),
            ..self.sensor("next_start", "Next Start", value)
        }
    }

    fn blade_usage(&self) -> EntityState {
        let value = self
            .view
            .record
            .as_ref()
            .and_then(|rec| rec.properties.blade_usage.clone())
            .map_or(Value::Null, Value::from);

        EntityState {
            icon: Some("mdi:knife"),
            ..self.sensor("blade_usage", "Blade Usage", value)
        }
    }

    fn frost(&self) -> EntityState {
        let value = self
            .view
            .record
            .as_ref()
            .and_then(|rec| rec.properties.frost_sensor);

        EntityState {
            device_class: Some("cold"),
            ..self.binary_sensor("frost", "Frost", value)
        }
    }

    fn rain(&self) -> EntityState {
        let value = self
            .view
            .record
            .as_ref()
            .and_then(|rec| rec.properties.rain_sensor);

        EntityState {
            device_class: Some("moisture"),
            ..self.binary_sensor("rain", "Rain", value)
        }
    }
}

/// All entities of one configured mower, lawn mower entity first.
#[must_use]
pub fn project(device: &ConfiguredDevice, view: &MowerView) -> Vec<EntityState> {
    let factory = EntityFactory::new(device, view);
    vec![
        factory.lawn_mower(),
        factory.battery(),
        factory.next_start(),
        factory.blade_usage(),
        factory.frost(),
        factory.rain(),
    ]
}
