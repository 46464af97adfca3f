//! Fixtures shared by the unit tests: device records, and an in-memory mower
//! account standing in for the cloud.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use greenworks_api::{
    Credentials, DeviceIdentity, DeviceProperties, DeviceRecord, GreenworksError,
    GreenworksResult, MowerApi, MowerCommand, OperatingStatus,
};

use crate::instance::Connector;

pub fn record(sn: &str, name: &str, online: bool, code: Option<i64>) -> DeviceRecord {
    DeviceRecord {
        identity: DeviceIdentity::Serial(sn.to_string()),
        id: Some(1000),
        serial: Some(sn.to_string()),
        product_id: Some("1600".to_string()),
        display_name: name.to_string(),
        model: Some("Optimow 4".to_string()),
        online,
        operating_status: OperatingStatus {
            code,
            text: None,
            battery: Some(80),
            next_start: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single(),
            request_time: None,
        },
        properties: DeviceProperties {
            frost_sensor: Some(false),
            rain_sensor: Some(true),
            blade_usage: Some("5432".to_string()),
            geofence: None,
        },
    }
}

/// Record without serial or id, identified by name only
pub fn named_record(name: &str, online: bool, code: Option<i64>) -> DeviceRecord {
    DeviceRecord {
        identity: DeviceIdentity::Name(name.to_string()),
        id: None,
        serial: None,
        product_id: None,
        model: None,
        ..record("", name, online, code)
    }
}

#[derive(Clone, Debug)]
pub enum FakeResponse {
    Devices(Vec<DeviceRecord>),
    Unauthorized,
    Failure,
}

pub struct FakeApi {
    next: Mutex<FakeResponse>,
    polls: AtomicUsize,
    fail_commands: AtomicBool,
    commands: Mutex<Vec<(DeviceIdentity, MowerCommand)>>,
}

impl FakeApi {
    pub fn new(devices: Vec<DeviceRecord>) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(FakeResponse::Devices(devices)),
            polls: AtomicUsize::new(0),
            fail_commands: AtomicBool::new(false),
            commands: Mutex::new(vec![]),
        })
    }

    pub fn respond(&self, response: FakeResponse) {
        *self.next.lock().unwrap() = response;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<(DeviceIdentity, MowerCommand)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl MowerApi for FakeApi {
    async fn list_devices(&self) -> GreenworksResult<Vec<DeviceRecord>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.next.lock().unwrap().clone();
        match next {
            FakeResponse::Devices(devices) => Ok(devices),
            FakeResponse::Unauthorized => Err(GreenworksError::unauthorized("token expired")),
            FakeResponse::Failure => Err(GreenworksError::malformed("connection reset")),
        }
    }

    async fn send_command(&self, device: &DeviceRecord, cmd: MowerCommand) -> GreenworksResult<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(GreenworksError::malformed("command rejected"));
        }
        self.commands
            .lock()
            .unwrap()
            .push((device.identity.clone(), cmd));
        Ok(())
    }
}

pub struct FakeConnector {
    pub api: Arc<FakeApi>,
    pub password: String,
    pub connects: AtomicUsize,
    pub delay: Duration,
}

impl FakeConnector {
    pub fn new(api: Arc<FakeApi>) -> Arc<Self> {
        Self::with_delay(api, Duration::ZERO)
    }

    /// Connector whose login takes `delay` to complete
    pub fn with_delay(api: Arc<FakeApi>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            api,
            password: "hunter2".to_string(),
            connects: AtomicUsize::new(0),
            delay,
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, credentials: &Credentials) -> GreenworksResult<Arc<dyn MowerApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if credentials.password != self.password {
            return Err(GreenworksError::unauthorized("bad password"));
        }
        Ok(self.api.clone())
    }
}

pub fn credentials(password: &str) -> Credentials {
    Credentials {
        email: "user@example.com".to_string(),
        password: password.to_string(),
        timezone: "UTC".to_string(),
    }
}
