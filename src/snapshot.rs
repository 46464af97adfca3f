use chrono::{DateTime, Utc};

use greenworks_api::DeviceRecord;

/// Every device of one account, as seen by a single successful poll.
///
/// Snapshots are immutable once built. A poll replaces the whole snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSnapshot {
    version: u64,
    fetched_at: DateTime<Utc>,
    devices: Vec<DeviceRecord>,
}

impl DeviceSnapshot {
    #[must_use]
    pub fn new(version: u64, devices: Vec<DeviceRecord>) -> Self {
        Self {
            version,
            fetched_at: Utc::now(),
            devices,
        }
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub const fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn display_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.display_name.clone()).collect()
    }
}
