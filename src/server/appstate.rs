use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::instance::{CloudConnector, Connector, Instance, InstanceStatus};

#[derive(Clone)]
pub struct AppState {
    conf: Arc<AppConfig>,
    instances: Arc<BTreeMap<String, Arc<Instance>>>,
    cancel: CancellationToken,
}

impl AppState {
    /// Build one instance per configured account. Each instance talks to the
    /// cloud url from its own config entry.
    pub fn from_config(config: AppConfig, cancel: CancellationToken) -> ApiResult<Self> {
        let mut instances = BTreeMap::new();

        for (name, conf) in &config.greenworks {
            let connector = Arc::new(CloudConnector::new(conf.base_url()?));
            let inst = Instance::from_config(name, conf, connector, &cancel)?;
            instances.insert(name.clone(), inst);
        }

        Ok(Self::new(config, instances, cancel))
    }

    /// Build with a single connector shared by all instances
    pub fn with_connector(
        config: AppConfig,
        connector: &Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> ApiResult<Self> {
        let mut instances = BTreeMap::new();

        for (name, conf) in &config.greenworks {
            let inst = Instance::from_config(name, conf, connector.clone(), &cancel)?;
            instances.insert(name.clone(), inst);
        }

        Ok(Self::new(config, instances, cancel))
    }

    fn new(
        config: AppConfig,
        instances: BTreeMap<String, Arc<Instance>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conf: Arc::new(config),
            instances: Arc::new(instances),
            cancel,
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        self.conf.clone()
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn instance(&self, name: &str) -> ApiResult<Arc<Instance>> {
        self.instances
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::InstanceNotFound(name.to_string()))
    }

    pub fn instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.values()
    }

    pub async fn statuses(&self) -> Vec<InstanceStatus> {
        let mut res = Vec::with_capacity(self.instances.len());
        for inst in self.instances.values() {
            res.push(inst.status().await);
        }
        res
    }

    /// Set up every instance in the background. Instances that fail setup
    /// retry on their own, so this never fails.
    pub fn start_all(&self) {
        for inst in self.instances.values() {
            let inst = inst.clone();
            tokio::spawn(async move { inst.start().await });
        }
    }

    pub async fn shutdown(&self) {
        let mut tasks = JoinSet::new();
        for inst in self.instances.values() {
            let inst = inst.clone();
            tasks.spawn(async move { inst.shutdown().await });
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                log::error!("Instance shutdown failed: {err}");
            }
        }
        self.cancel.cancel();
    }
}
