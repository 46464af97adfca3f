use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use greenworks_api::{
    Credentials, GreenworksClient, GreenworksResult, MowerApi, MowerCommand,
};

use crate::config::InstanceConfig;
use crate::coordinator::{Coordinator, UpdateError, UpdateStatus};
use crate::entity::{self, EntityState};
use crate::error::{ApiError, ApiResult};
use crate::reconcile::{ConfiguredDevice, MowerView, find_device};

/// Produces a logged-in account handle from a set of credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> GreenworksResult<Arc<dyn MowerApi>>;
}

pub struct CloudConnector {
    base_url: Url,
}

impl CloudConnector {
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

#[async_trait]
impl Connector for CloudConnector {
    async fn connect(&self, credentials: &Credentials) -> GreenworksResult<Arc<dyn MowerApi>> {
        let client = GreenworksClient::new(self.base_url.clone(), credentials.clone())?;
        client.login().await?;
        Ok(Arc::new(client))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    SettingUp,
    SetupRetry,
    Loaded,
    ReauthRequired,
    Stopped,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub mower_name: String,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<UpdateStatus>,
}

struct Live {
    coordinator: Arc<Coordinator>,
    poller: CancellationToken,
}

/// One configured account plus the mower selected from it.
pub struct Instance {
    name: String,
    interval: Duration,
    connector: Arc<dyn Connector>,
    credentials: Mutex<Credentials>,
    device: Mutex<ConfiguredDevice>,
    live: Mutex<Option<Live>>,
    setup_lock: Mutex<()>,
    state: watch::Sender<InstanceState>,
    cancel: CancellationToken,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        mower_name: impl Into<String>,
        credentials: Credentials,
        interval: Duration,
        connector: Arc<dyn Connector>,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(InstanceState::SettingUp);

        Arc::new(Self {
            name: name.into(),
            interval,
            connector,
            credentials: Mutex::new(credentials),
            device: Mutex::new(ConfiguredDevice::new(mower_name)),
            live: Mutex::new(None),
            setup_lock: Mutex::new(()),
            state,
            cancel: parent.child_token(),
        })
    }

    pub fn from_config(
        name: &str,
        conf: &InstanceConfig,
        connector: Arc<dyn Connector>,
        parent: &CancellationToken,
    ) -> ApiResult<Arc<Self>> {
        Ok(Self::new(
            name,
            &conf.mower_name,
            conf.credentials(name)?,
            conf.poll_interval(name),
            connector,
            parent,
        ))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        *self.state.borrow()
    }

    fn set_state(&self, state: InstanceState) {
        self.state.send_replace(state);
    }

    fn setup_failed(&self, err: UpdateError) -> UpdateError {
        if err.is_auth() {
            log::error!("[{}] Setup failed: {err}", self.name);
            self.set_state(InstanceState::ReauthRequired);
        } else {
            log::warn!(
                "[{}] Setup failed: {err}. Retrying in {}s",
                self.name,
                self.interval.as_secs()
            );
            self.set_state(InstanceState::SetupRetry);
        }
        err
    }

    /// Log in, fetch the first snapshot, bind the configured mower and start
    /// the poller. Replaces a poller left over from an earlier setup.
    pub async fn setup(self: &Arc<Self>) -> Result<(), UpdateError> {
        let _guard = self.setup_lock.lock().await;
        if self.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        if let Some(old) = self.live.lock().await.take() {
            old.poller.cancel();
        }
        self.set_state(InstanceState::SettingUp);

        let credentials = self.credentials.lock().await.clone();
        // shutdown may land while either call is in flight
        let api = tokio::select! {
            () = self.cancel.cancelled() => return Err(UpdateError::Cancelled),
            res = self.connector.connect(&credentials) => {
                res.map_err(|err| self.setup_failed(err.into()))?
            }
        };

        let coordinator = Arc::new(Coordinator::new(&self.name, api, self.interval));
        let snapshot = tokio::select! {
            () = self.cancel.cancelled() => return Err(UpdateError::Cancelled),
            res = coordinator.refresh() => res.map_err(|err| self.setup_failed(err))?,
        };

        {
            let mut device = self.device.lock().await;
            if device.bind(&snapshot).is_none() {
                log::warn!(
                    "[{}] Mower {:?} not found. Account has: {:?}",
                    self.name,
                    device.display_name(),
                    snapshot.display_names()
                );
            }
        }

        let poller = self.cancel.child_token();
        tokio::spawn({
            let inst = self.clone();
            let coordinator = coordinator.clone();
            let poller = poller.clone();
            async move {
                if let Err(UpdateError::Auth(_)) = coordinator.run(poller).await {
                    inst.set_state(InstanceState::ReauthRequired);
                }
            }
        });

        *self.live.lock().await = Some(Live {
            coordinator,
            poller,
        });
        self.set_state(InstanceState::Loaded);

        log::info!("[{}] Loaded", self.name);
        Ok(())
    }

    /// Run setup, retrying transient failures every poll interval until
    /// loaded, rejected or shut down.
    pub async fn start(self: &Arc<Self>) {
        if let Err(UpdateError::Transient(_)) = self.setup().await {
            self.retry().await;
        }
    }

    async fn retry(self: &Arc<Self>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(self.interval) => {}
            }

            // a reauth may have taken over in the meantime
            if self.state() != InstanceState::SetupRetry {
                return;
            }

            if !matches!(self.setup().await, Err(UpdateError::Transient(_))) {
                return;
            }
        }
    }

    /// Replace the account credentials and set up again.
    pub async fn reauth(self: &Arc<Self>, credentials: Credentials) -> ApiResult<()> {
        *self.credentials.lock().await = credentials;

        match self.setup().await {
            Ok(()) => Ok(()),
            Err(UpdateError::Auth(_)) => Err(ApiError::ReauthRequired(self.name.clone())),
            Err(UpdateError::Cancelled) => Err(ApiError::NotLoaded(self.name.clone())),
            Err(UpdateError::Transient(err)) => {
                tokio::spawn({
                    let inst = self.clone();
                    async move { inst.retry().await }
                });
                Err(err.into())
            }
        }
    }

    /// Stop polling for good. Waits for a setup in progress to give up, so
    /// nothing is published after this returns.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _guard = self.setup_lock.lock().await;
        if let Some(live) = self.live.lock().await.take() {
            live.poller.cancel();
        }
        self.set_state(InstanceState::Stopped);
        log::info!("[{}] Stopped", self.name);
    }

    async fn coordinator(&self) -> ApiResult<Arc<Coordinator>> {
        if let Some(live) = &*self.live.lock().await {
            return Ok(live.coordinator.clone());
        }

        match self.state() {
            InstanceState::ReauthRequired => Err(ApiError::ReauthRequired(self.name.clone())),
            _ => Err(ApiError::NotLoaded(self.name.clone())),
        }
    }

    pub async fn view(&self) -> ApiResult<MowerView> {
        let snapshot = self.coordinator().await?.snapshot();
        let device = self.device.lock().await.clone();
        Ok(MowerView::reconcile(&device, snapshot.as_deref()))
    }

    pub async fn entities(&self) -> ApiResult<Vec<EntityState>> {
        let snapshot = self.coordinator().await?.snapshot();
        let device = self.device.lock().await.clone();
        let view = MowerView::reconcile(&device, snapshot.as_deref());
        Ok(entity::project(&device, &view))
    }

    /// Display names of every device on the account, in cloud order
    pub async fn device_names(&self) -> ApiResult<Vec<String>> {
        let snapshot = self.coordinator().await?.snapshot();
        Ok(snapshot.map(|snap| snap.display_names()).unwrap_or_default())
    }

    pub async fn status(&self) -> InstanceStatus {
        let last_update = self
            .live
            .lock()
            .await
            .as_ref()
            .map(|live| live.coordinator.last_update());

        InstanceStatus {
            name: self.name.clone(),
            mower_name: self.device.lock().await.display_name().to_string(),
            state: self.state(),
            last_update,
        }
    }

    async fn try_execute(&self, cmd: MowerCommand) -> ApiResult<()> {
        let coordinator = self.coordinator().await?;
        let snapshot = coordinator.snapshot();
        let device = self.device.lock().await.clone();

        let Some(rec) = snapshot.as_deref().and_then(|snap| find_device(&device, snap)) else {
            return Err(ApiError::service_error(format!(
                "Mower {:?} not in latest snapshot",
                device.display_name()
            )));
        };

        let api = coordinator.api();
        match cmd {
            MowerCommand::Start => api.start_mowing(rec).await?,
            MowerCommand::Pause => api.pause(rec).await?,
            MowerCommand::Dock => api.return_to_dock(rec).await?,
        }
        Ok(())
    }

    /// Send a command and wait for it. Failures are logged, never returned:
    /// the next poll shows what the mower actually did.
    pub async fn execute(&self, cmd: MowerCommand) {
        match self.try_execute(cmd).await {
            Ok(()) => log::info!("[{}] Sent {} command", self.name, cmd.operation()),
            Err(err) => log::warn!("[{}] {} command failed: {err}", self.name, cmd.operation()),
        }
    }

    /// Fire-and-forget variant of [`Self::execute`]. Only refuses when the
    /// instance has nothing loaded to address.
    pub async fn command(self: &Arc<Self>, cmd: MowerCommand) -> ApiResult<()> {
        self.coordinator().await?;

        tokio::spawn({
            let inst = self.clone();
            async move { inst.execute(cmd).await }
        });
        Ok(())
    }
}
