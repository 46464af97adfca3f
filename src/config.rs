use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use camino::Utf8Path;
use config::{Config, ConfigError, FileFormat};
use serde::Deserialize;
use url::Url;

use greenworks_api::{Credentials, GreenworksClient};

use crate::error::{ApiError, ApiResult};

#[derive(Clone, Debug, Deserialize)]
pub struct BridgeConfig {
    pub ipaddress: Ipv4Addr,
    pub http_port: u16,
}

/// Secret value that never shows up in logs or debug output
#[derive(Clone, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<<REDACTED>>")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One configured integration instance: an account and the mower picked
/// from it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct InstanceConfig {
    pub email: String,
    pub password: Option<Secret>,
    pub password_env: Option<String>,
    pub mower_name: String,
    pub timezone: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub url: Option<Url>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub greenworks: BTreeMap<String, InstanceConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn has_instances(&self) -> bool {
        !self.greenworks.is_empty()
    }
}

impl InstanceConfig {
    pub const DEFAULT_PASSWORD_ENV: &'static str = "GREENWORKS_PASSWORD";
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);
    pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(120);

    pub fn credentials(&self, name: &str) -> ApiResult<Credentials> {
        let password = if let Some(password) = &self.password {
            password.expose().to_string()
        } else {
            let env = self
                .password_env
                .as_deref()
                .unwrap_or(Self::DEFAULT_PASSWORD_ENV);
            std::env::var(env).map_err(|_| {
                ApiError::service_error(format!(
                    "[{name}] No password configured, and env var {env} is not set"
                ))
            })?
        };

        if password.trim().is_empty() {
            return Err(ApiError::service_error(format!("[{name}] Empty password")));
        }

        Ok(Credentials {
            email: self.email.clone(),
            password,
            timezone: self.timezone(),
        })
    }

    /// Configured timezone, falling back to the timezone of the host.
    #[must_use]
    pub fn timezone(&self) -> String {
        self.timezone
            .clone()
            .or_else(|| iana_time_zone::get_timezone().ok())
            .unwrap_or_else(|| "UTC".to_string())
    }

    #[must_use]
    pub fn poll_interval(&self, name: &str) -> Duration {
        let Some(secs) = self.poll_interval_secs else {
            return Self::MAX_POLL_INTERVAL;
        };

        let requested = Duration::from_secs(secs);
        let interval = requested.clamp(Self::MIN_POLL_INTERVAL, Self::MAX_POLL_INTERVAL);
        if interval != requested {
            log::warn!(
                "[{name}] Poll interval {secs}s out of range, using {}s",
                interval.as_secs()
            );
        }
        interval
    }

    pub fn base_url(&self) -> ApiResult<Url> {
        match &self.url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(GreenworksClient::DEFAULT_URL)?),
        }
    }
}

fn build<S>(source: S) -> Result<AppConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings = Config::builder()
        .set_default("bridge.ipaddress", "0.0.0.0")?
        .set_default("bridge.http_port", 8080)?
        .add_source(source)
        .build()?;

    settings.try_deserialize()
}

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    build(config::File::with_name(filename.as_str()))
}

pub fn parse_str(yaml: &str) -> Result<AppConfig, ConfigError> {
    build(config::File::from_str(yaml, FileFormat::Yaml))
}
