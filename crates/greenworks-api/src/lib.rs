pub mod client;
pub mod device;
pub mod error;
pub mod models;

pub use client::{Credentials, GreenworksClient, MowerApi, MowerCommand};
pub use device::{
    DeviceIdentity, DeviceProperties, DeviceRecord, Geofence, OperatingStatus, state_code,
};
pub use error::{GreenworksError, GreenworksResult};
