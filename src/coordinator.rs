use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use greenworks_api::{GreenworksError, MowerApi};

use crate::snapshot::DeviceSnapshot;

#[derive(Error, Debug)]
pub enum UpdateError {
    /// Credentials rejected. Polling again will not help.
    #[error("Authentication failed: {0}")]
    Auth(GreenworksError),

    #[error("Problems calling GreenWorks: {0}")]
    Transient(GreenworksError),

    #[error("Cancelled")]
    Cancelled,
}

impl From<GreenworksError> for UpdateError {
    fn from(err: GreenworksError) -> Self {
        if err.is_unauthorized() {
            Self::Auth(err)
        } else {
            Self::Transient(err)
        }
    }
}

impl UpdateError {
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Success {
        at: DateTime<Utc>,
    },
    Failed {
        at: DateTime<Utc>,
        auth: bool,
        reason: String,
    },
}

/// What the poller publishes. Readers clone the snapshot pointer and never
/// see a half-built snapshot.
#[derive(Clone, Debug)]
pub struct CoordinatorState {
    pub snapshot: Option<Arc<DeviceSnapshot>>,
    pub last_update: UpdateStatus,
}

/// Periodic poller for one account.
pub struct Coordinator {
    name: String,
    api: Arc<dyn MowerApi>,
    interval: Duration,
    state: watch::Sender<CoordinatorState>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, api: Arc<dyn MowerApi>, interval: Duration) -> Self {
        let (state, _) = watch::channel(CoordinatorState {
            snapshot: None,
            last_update: UpdateStatus::Pending,
        });

        Self {
            name: name.into(),
            api,
            interval,
            state,
        }
    }

    #[must_use]
    pub fn api(&self) -> Arc<dyn MowerApi> {
        self.api.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Latest published snapshot, if any poll has succeeded yet
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.state.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn last_update(&self) -> UpdateStatus {
        self.state.borrow().last_update.clone()
    }

    /// Poll once. On success the result replaces the published snapshot; on
    /// failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<DeviceSnapshot>, UpdateError> {
        match self.api.list_devices().await {
            Ok(devices) => {
                let version = self
                    .state
                    .borrow()
                    .snapshot
                    .as_ref()
                    .map_or(1, |snap| snap.version() + 1);
                let snapshot = Arc::new(DeviceSnapshot::new(version, devices));

                self.state.send_modify(|state| {
                    state.snapshot = Some(snapshot.clone());
                    state.last_update = UpdateStatus::Success {
                        at: snapshot.fetched_at(),
                    };
                });

                log::debug!(
                    "[{}] Fetched {} device(s), snapshot version {}",
                    self.name,
                    snapshot.devices().len(),
                    snapshot.version()
                );
                Ok(snapshot)
            }
            Err(err) => {
                let err = UpdateError::from(err);
                self.state.send_modify(|state| {
                    state.last_update = UpdateStatus::Failed {
                        at: Utc::now(),
                        auth: err.is_auth(),
                        reason: err.to_string(),
                    };
                });
                Err(err)
            }
        }
    }

    /// Poll on every interval tick until cancelled, or until the credentials
    /// are rejected. The first tick comes one interval from now, since setup
    /// performs the initial refresh.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), UpdateError> {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            // a poll in flight is abandoned on cancellation, and never publishes
            let res = tokio::select! {
                () = cancel.cancelled() => break,
                res = self.refresh() => res,
            };

            match res {
                Ok(_) => {}
                Err(err @ UpdateError::Auth(_)) => {
                    log::error!(
                        "[{}] {err}. Stopped polling, reauthentication required",
                        self.name
                    );
                    return Err(err);
                }
                Err(err) => {
                    log::warn!("[{}] {err}. Keeping previous data", self.name);
                }
            }
        }

        log::debug!("[{}] Poller stopped", self.name);
        Ok(())
    }
}
