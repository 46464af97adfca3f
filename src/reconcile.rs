use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use greenworks_api::{DeviceIdentity, DeviceRecord};

use crate::activity::Activity;
use crate::snapshot::DeviceSnapshot;

pub type Attributes = BTreeMap<String, Value>;

/// The mower a configured instance is bound to.
///
/// Created from the display name picked at setup. The vendor identity is
/// filled in from the first snapshot that contains the name, and is preferred
/// over the name from then on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredDevice {
    display_name: String,
    identity: Option<DeviceIdentity>,
    serial: Option<String>,
    id: Option<u64>,
}

impl ConfiguredDevice {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            identity: None,
            serial: None,
            id: None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Vendor identity (serial or id), when one has been resolved
    #[must_use]
    pub fn hardware_id(&self) -> Option<String> {
        self.identity
            .as_ref()
            .filter(|id| id.is_hardware())
            .map(ToString::to_string)
    }

    /// Resolve the vendor identity by display name. Keeps an identity that
    /// was already resolved.
    pub fn bind(&mut self, snapshot: &DeviceSnapshot) -> Option<&DeviceIdentity> {
        if self.identity.is_none() {
            if let Some(rec) = snapshot
                .iter()
                .find(|rec| rec.display_name == self.display_name)
            {
                self.identity = Some(rec.identity.clone());
                self.serial.clone_from(&rec.serial);
                self.id = rec.id;
            }
        }
        self.identity.as_ref()
    }

    /// Serial comparison when both sides have one, then id, then display
    /// name.
    #[must_use]
    pub fn matches(&self, rec: &DeviceRecord) -> bool {
        if let (Some(serial), Some(other)) = (&self.serial, &rec.serial) {
            return serial == other;
        }
        if let (Some(id), Some(other)) = (self.id, rec.id) {
            return id == other;
        }
        rec.display_name == self.display_name
    }
}

/// Locate the configured device in a snapshot. Scan order is snapshot order,
/// first match wins.
#[must_use]
pub fn find_device<'a>(
    device: &ConfiguredDevice,
    snapshot: &'a DeviceSnapshot,
) -> Option<&'a DeviceRecord> {
    snapshot.iter().find(|rec| device.matches(rec))
}

/// Everything an entity needs to render, derived from one snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MowerView {
    pub available: bool,
    pub activity: Option<Activity>,
    pub attributes: Attributes,
    #[serde(skip)]
    pub record: Option<DeviceRecord>,
}

impl MowerView {
    /// A device missing from the snapshot (or no snapshot at all) is
    /// unavailable with no activity, never an error.
    #[must_use]
    pub fn reconcile(device: &ConfiguredDevice, snapshot: Option<&DeviceSnapshot>) -> Self {
        let Some(rec) = snapshot.and_then(|snap| find_device(device, snap)) else {
            return Self {
                available: false,
                activity: None,
                attributes: Attributes::new(),
                record: None,
            };
        };

        Self {
            available: rec.online,
            activity: Some(Activity::from_status(&rec.operating_status)),
            attributes: mower_attributes(rec),
            record: Some(rec.clone()),
        }
    }
}

fn mower_attributes(rec: &DeviceRecord) -> Attributes {
    let status = &rec.operating_status;
    let mut attrs = Attributes::new();

    if let Some(battery) = status.battery {
        attrs.insert("battery_level".to_string(), Value::from(battery));
    }
    if let Some(next_start) = status.next_start {
        attrs.insert("next_start".to_string(), Value::from(next_start.to_rfc3339()));
    }
    if let Some(request_time) = status.request_time {
        attrs.insert(
            "request_time".to_string(),
            Value::from(request_time.to_rfc3339()),
        );
    }

    attrs
}

#[cfg(test)]
mod tests {
    use greenworks_api::DeviceIdentity;
    use maplit::btreemap;
    use serde_json::json;

    use crate::activity::Activity;
    use crate::reconcile::{ConfiguredDevice, MowerView, find_device};
    use crate::snapshot::DeviceSnapshot;
    use crate::test_utils::{named_record, record};

    #[test]
    fn mowing_and_online() {
        let snap = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", true, Some(4))]);
        let view = MowerView::reconcile(&ConfiguredDevice::new("Backyard"), Some(&snap));

        assert!(view.available);
        assert_eq!(view.activity, Some(Activity::Mowing));
    }

    #[test]
    fn offline_is_unavailable_regardless_of_code() {
        let snap = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", false, Some(4))]);
        let view = MowerView::reconcile(&ConfiguredDevice::new("Backyard"), Some(&snap));

        assert!(!view.available);
        assert!(view.record.is_some());
    }

    #[test]
    fn name_match_skips_earlier_records() {
        let snap = DeviceSnapshot::new(
            1,
            vec![
                named_record("Front", true, Some(7)),
                named_record("Backyard", true, Some(2)),
            ],
        );
        let device = ConfiguredDevice::new("Backyard");

        let rec = find_device(&device, &snap).unwrap();
        assert_eq!(rec.display_name, "Backyard");
        assert_eq!(
            MowerView::reconcile(&device, Some(&snap)).activity,
            Some(Activity::Paused)
        );
    }

    #[test]
    fn bound_identity_survives_rename() {
        let first = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", true, Some(7))]);
        let mut device = ConfiguredDevice::new("Backyard");
        assert_eq!(
            device.bind(&first),
            Some(&DeviceIdentity::Serial("SN1".into()))
        );
        assert_eq!(device.hardware_id().as_deref(), Some("SN1"));

        let renamed = DeviceSnapshot::new(
            2,
            vec![
                record("SN2", "Backyard", true, Some(1)),
                record("SN1", "Garden", true, Some(4)),
            ],
        );
        let rec = find_device(&device, &renamed).unwrap();
        assert_eq!(rec.identity, DeviceIdentity::Serial("SN1".into()));
    }

    #[test]
    fn bound_device_survives_serial_dropping_out() {
        let first = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", true, Some(4))]);
        let mut device = ConfiguredDevice::new("Backyard");
        device.bind(&first);

        // firmware stopped reporting the serial, and the mower was renamed
        let mut rec = record("SN1", "Garden", true, Some(7));
        rec.serial = None;
        rec.identity = DeviceIdentity::Id(1000);
        let mut other = named_record("Backyard", true, Some(4));
        other.id = Some(2000);

        let later = DeviceSnapshot::new(2, vec![other, rec]);
        let found = find_device(&device, &later).unwrap();
        assert_eq!(found.identity, DeviceIdentity::Id(1000));
        assert_eq!(device.hardware_id().as_deref(), Some("SN1"));
    }

    #[test]
    fn duplicate_names_first_wins() {
        let snap = DeviceSnapshot::new(
            1,
            vec![
                record("SN1", "Backyard", true, Some(4)),
                record("SN2", "Backyard", true, Some(7)),
            ],
        );
        let rec = find_device(&ConfiguredDevice::new("Backyard"), &snap).unwrap();
        assert_eq!(rec.identity, DeviceIdentity::Serial("SN1".into()));
    }

    #[test]
    fn missing_or_empty_snapshot_is_unknown() {
        let device = ConfiguredDevice::new("Backyard");

        for view in [
            MowerView::reconcile(&device, None),
            MowerView::reconcile(&device, Some(&DeviceSnapshot::new(1, vec![]))),
        ] {
            assert!(!view.available);
            assert_eq!(view.activity, None);
            assert!(view.attributes.is_empty());
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let snap = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", true, Some(6))]);
        let device = ConfiguredDevice::new("Backyard");

        let a = MowerView::reconcile(&device, Some(&snap));
        let b = MowerView::reconcile(&device, Some(&snap));
        assert_eq!(a, b);
    }

    #[test]
    fn attributes_are_flat() {
        let snap = DeviceSnapshot::new(1, vec![record("SN1", "Backyard", true, Some(7))]);
        let view = MowerView::reconcile(&ConfiguredDevice::new("Backyard"), Some(&snap));

        assert_eq!(
            view.attributes,
            btreemap! {
                "battery_level".to_string() => json!(80),
                "next_start".to_string() => json!("2024-06-01T08:00:00+00:00"),
            }
        );
    }

    #[test]
    fn unbound_device_has_no_hardware_id() {
        let snap = DeviceSnapshot::new(1, vec![named_record("Backyard", true, None)]);
        let mut device = ConfiguredDevice::new("Backyard");

        assert_eq!(
            device.bind(&snap),
            Some(&DeviceIdentity::Name("Backyard".into()))
        );
        assert_eq!(device.hardware_id(), None);
    }
}
