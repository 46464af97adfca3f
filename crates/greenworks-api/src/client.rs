use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use crate::device::DeviceRecord;
use crate::error::{GreenworksError, GreenworksResult};
use crate::models::{CommandRequest, LoginRequest, LoginResponse, RawDevice, RawProperties};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MowerCommand {
    Start,
    Pause,
    Dock,
}

impl MowerCommand {
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Dock => "home",
        }
    }
}

/// The remote operations a mower account exposes.
#[async_trait]
pub trait MowerApi: Send + Sync {
    /// Fetch every device subscribed to the account, in cloud order.
    async fn list_devices(&self) -> GreenworksResult<Vec<DeviceRecord>>;

    async fn send_command(&self, device: &DeviceRecord, cmd: MowerCommand) -> GreenworksResult<()>;

    async fn start_mowing(&self, device: &DeviceRecord) -> GreenworksResult<()> {
        self.send_command(device, MowerCommand::Start).await
    }

    async fn pause(&self, device: &DeviceRecord) -> GreenworksResult<()> {
        self.send_command(device, MowerCommand::Pause).await
    }

    async fn return_to_dock(&self, device: &DeviceRecord) -> GreenworksResult<()> {
        self.send_command(device, MowerCommand::Dock).await
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub timezone: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<<REDACTED>>")
            .field("timezone", &self.timezone)
            .finish()
    }
}

#[derive(Clone, Debug)]
struct Session {
    access_token: String,
    user_id: u64,
}

pub struct GreenworksClient {
    base_url: Url,
    http: reqwest::Client,
    credentials: Credentials,
    session: Mutex<Option<Session>>,
}

impl GreenworksClient {
    pub const DEFAULT_URL: &'static str = "https://xapi.globetools.systems/v2/";
    const CORP_ID: &'static str = "100fa2b00b622800";
    const TOKEN_HEADER: &'static str = "Access-Token";
    const DEFAULT_TIMEOUT_SECS: u64 = 15;

    pub fn new(base_url: Url, credentials: Credentials) -> GreenworksResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            http,
            credentials,
            session: Mutex::new(None),
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> GreenworksResult<Url> {
        let base = if self.base_url.path().ends_with('/') {
            self.base_url.clone()
        } else {
            Url::parse(&format!("{}/", self.base_url))?
        };
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    const fn is_auth_status(status: StatusCode) -> bool {
        matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    async fn check_status(
        response: reqwest::Response,
        action: &str,
    ) -> GreenworksResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();

        if Self::is_auth_status(status) {
            return Err(GreenworksError::unauthorized(format!(
                "GreenWorks cloud rejected credentials during {action}"
            )));
        }

        Err(GreenworksError::Status {
            status,
            action: action.to_string(),
            body,
        })
    }

    /// Log in with the configured credentials, replacing any cached session.
    pub async fn login(&self) -> GreenworksResult<()> {
        let session = self.fetch_session().await?;
        *self.session.lock().await = Some(session);
        Ok(())
    }

    async fn fetch_session(&self) -> GreenworksResult<Session> {
        let url = self.endpoint_url("user_auth")?;
        let req = LoginRequest {
            corp_id: Self::CORP_ID,
            email: &self.credentials.email,
            password: &self.credentials.password,
            timezone: &self.credentials.timezone,
        };

        log::debug!("Logging in to GreenWorks cloud as {}", self.credentials.email);

        let response = self.http.post(url).json(&req).send().await?;

        // the cloud answers a bad password with 400
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(GreenworksError::unauthorized(format!(
                "Login rejected for {}",
                self.credentials.email
            )));
        }

        let response = Self::check_status(response, "POST user_auth").await?;
        let login: LoginResponse = response.json().await?;

        if let Some(expire) = login.expire_in {
            log::debug!("GreenWorks access token valid for {expire}s");
        }

        Ok(Session {
            access_token: login.access_token,
            user_id: login.user_id,
        })
    }

    async fn session(&self) -> GreenworksResult<Session> {
        let mut lock = self.session.lock().await;
        if let Some(session) = &*lock {
            return Ok(session.clone());
        }
        let session = self.fetch_session().await?;
        *lock = Some(session.clone());
        drop(lock);
        Ok(session)
    }

    /// Send an authorized request. An expired token gets exactly one fresh
    /// login; a rejected login surfaces as [`GreenworksError::Unauthorized`].
    async fn send_authorized<F>(&self, action: &str, build: F) -> GreenworksResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client, &Session) -> GreenworksResult<RequestBuilder> + Send + Sync,
    {
        let session = self.session().await?;
        let response = build(&self.http, &session)?
            .header(Self::TOKEN_HEADER, &session.access_token)
            .send()
            .await?;

        if !Self::is_auth_status(response.status()) {
            return Self::check_status(response, action).await;
        }

        log::debug!("Access token rejected during {action}, logging in again");
        self.session.lock().await.take();

        let session = self.session().await?;
        let response = build(&self.http, &session)?
            .header(Self::TOKEN_HEADER, &session.access_token)
            .send()
            .await?;

        Self::check_status(response, action).await
    }

    async fn get_json<T: DeserializeOwned>(&self, action: &str, endpoint: &str) -> GreenworksResult<T> {
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .send_authorized(action, |http, _| Ok(http.get(url.clone())))
            .await?;
        Ok(response.json().await?)
    }

    async fn get_properties(&self, product_id: &str, device_id: u64) -> GreenworksResult<RawProperties> {
        let endpoint = format!("product/{product_id}/v2/device/{device_id}/property");
        self.get_json(&format!("GET {endpoint}"), &endpoint).await
    }

    fn command_endpoint(device: &DeviceRecord) -> GreenworksResult<String> {
        match (&device.product_id, device.id) {
            (Some(product_id), Some(id)) => Ok(format!("product/{product_id}/v2/device/{id}/property")),
            _ => Err(GreenworksError::malformed(format!(
                "device {} lacks product/device id, cannot address it",
                device.identity
            ))),
        }
    }
}

#[async_trait]
impl MowerApi for GreenworksClient {
    async fn list_devices(&self) -> GreenworksResult<Vec<DeviceRecord>> {
        let user_id = self.session().await?.user_id;
        let endpoint = format!("user/{user_id}/subscribe/devices?version=0");
        let devices: Vec<RawDevice> = self.get_json("GET subscribed devices", &endpoint).await?;

        let mut res = Vec::with_capacity(devices.len());
        for raw in devices {
            let product_id = raw
                .product_id
                .as_ref()
                .map(|x| x.as_str().map_or_else(|| x.to_string(), str::to_string));

            let props = match (product_id, raw.id) {
                (Some(product_id), Some(id)) => self.get_properties(&product_id, id).await?,
                _ => RawProperties::default(),
            };

            res.push(DeviceRecord::from_wire(raw, &props)?);
        }

        Ok(res)
    }

    async fn send_command(&self, device: &DeviceRecord, cmd: MowerCommand) -> GreenworksResult<()> {
        let url = self.endpoint_url(&Self::command_endpoint(device)?)?;
        let body = CommandRequest {
            operation: cmd.operation(),
        };
        let action = format!("{} command for {}", cmd.operation(), device.identity);

        log::debug!("Sending {action}");

        self.send_authorized(&action, |http, _| Ok(http.post(url.clone()).json(&body)))
            .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::StatusCode;
    use url::Url;

    use crate::client::stub::{self, Cloud};
    use crate::client::{Credentials, GreenworksClient, MowerApi, MowerCommand};
    use crate::device::DeviceIdentity;
    use crate::error::GreenworksError;

    fn client(base: &str) -> GreenworksClient {
        GreenworksClient::new(
            Url::parse(base).unwrap(),
            Credentials {
                email: "user@example.com".into(),
                password: "hunter2".into(),
                timezone: "Europe/Copenhagen".into(),
            },
        )
        .unwrap()
    }

    async fn cloud_client(cloud: &Arc<Cloud>) -> GreenworksClient {
        let url = stub::serve(cloud.clone()).await;
        client(url.as_str())
    }

    #[test]
    fn endpoint_url_keeps_base_path() {
        let a = client("https://cloud.example.com/v2");
        let b = client("https://cloud.example.com/v2/");

        let expected = "https://cloud.example.com/v2/user_auth";
        assert_eq!(a.endpoint_url("/user_auth").unwrap().as_str(), expected);
        assert_eq!(b.endpoint_url("user_auth").unwrap().as_str(), expected);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            email: "user@example.com".into(),
            password: "hunter2".into(),
            timezone: "UTC".into(),
        };
        let text = format!("{creds:?}");
        assert!(!text.contains("hunter2"));
        assert!(text.contains("user@example.com"));
    }

    #[test]
    fn command_operations() {
        assert_eq!(MowerCommand::Start.operation(), "start");
        assert_eq!(MowerCommand::Pause.operation(), "pause");
        assert_eq!(MowerCommand::Dock.operation(), "home");
    }

    #[test]
    fn auth_statuses() {
        assert!(GreenworksClient::is_auth_status(StatusCode::UNAUTHORIZED));
        assert!(GreenworksClient::is_auth_status(StatusCode::FORBIDDEN));
        assert!(!GreenworksClient::is_auth_status(StatusCode::BAD_REQUEST));
        assert!(!GreenworksClient::is_auth_status(
            StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn rejected_login_is_unauthorized() {
        let cloud = Arc::new(Cloud {
            reject_login: true,
            ..Cloud::default()
        });
        let client = cloud_client(&cloud).await;

        assert!(client.login().await.unwrap_err().is_unauthorized());
        assert!(client.list_devices().await.unwrap_err().is_unauthorized());
        assert_eq!(cloud.listings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_logs_in_once_more() {
        let cloud = Arc::new(Cloud {
            expired: AtomicUsize::new(1),
            ..Cloud::default()
        });
        let client = cloud_client(&cloud).await;

        let devices = client.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(cloud.logins.load(Ordering::SeqCst), 2);
        assert_eq!(cloud.listings.load(Ordering::SeqCst), 2);

        // the fresh session is reused
        client.list_devices().await.unwrap();
        assert_eq!(cloud.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn token_rejected_twice_is_unauthorized() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let cloud = Arc::new(Cloud {
                listing_status: Some(status),
                ..Cloud::default()
            });
            let client = cloud_client(&cloud).await;

            let err = client.list_devices().await.unwrap_err();
            assert!(err.is_unauthorized(), "{status}: {err}");
            assert_eq!(cloud.logins.load(Ordering::SeqCst), 2);
            assert_eq!(cloud.listings.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test]
    async fn server_error_is_not_an_auth_failure() {
        let cloud = Arc::new(Cloud {
            listing_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
            ..Cloud::default()
        });
        let client = cloud_client(&cloud).await;

        let err = client.list_devices().await.unwrap_err();
        assert!(!err.is_unauthorized());
        assert!(matches!(
            err,
            GreenworksError::Status { status, ref body, .. }
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "listing refused"
        ));
        assert_eq!(cloud.logins.load(Ordering::SeqCst), 1);
        assert_eq!(cloud.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listing_merges_property_documents() {
        let cloud = Arc::new(Cloud::default());
        let client = cloud_client(&cloud).await;

        let devices = client.list_devices().await.unwrap();

        let mower = &devices[0];
        assert_eq!(mower.identity, DeviceIdentity::Serial("SN1".into()));
        assert_eq!(mower.product_id.as_deref(), Some("42"));
        assert!(mower.online);
        assert_eq!(mower.operating_status.code, Some(4));
        assert_eq!(mower.operating_status.battery, Some(80));
        assert_eq!(
            mower.operating_status.next_start.unwrap().to_rfc3339(),
            "2024-06-01T08:00:00+00:00"
        );
        assert_eq!(mower.properties.rain_sensor, Some(true));
        assert_eq!(mower.properties.frost_sensor, Some(false));
        assert_eq!(mower.properties.blade_usage.as_deref(), Some("5432"));

        // no ids, so no property document; status comes from the listing
        let shed = &devices[1];
        assert_eq!(shed.identity, DeviceIdentity::Name("Shed".into()));
        assert!(!shed.online);
        assert_eq!(shed.operating_status.code, Some(7));
        assert_eq!(shed.properties.rain_sensor, None);
    }

    #[tokio::test]
    async fn commands_post_the_operation() {
        let cloud = Arc::new(Cloud::default());
        let client = cloud_client(&cloud).await;

        let devices = client.list_devices().await.unwrap();
        client.start_mowing(&devices[0]).await.unwrap();
        client.return_to_dock(&devices[0]).await.unwrap();

        assert_eq!(*cloud.commands.lock().unwrap(), ["start", "home"]);

        let err = client.pause(&devices[1]).await.unwrap_err();
        assert!(matches!(err, GreenworksError::Malformed(_)));
    }
}
