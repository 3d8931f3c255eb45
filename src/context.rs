//! Shared handles passed to every component.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigStore, DevConfig};
use crate::download::DownloadQueue;
use crate::platform::HostPlatform;
use crate::presentation::Presenter;
use crate::server_log::ServerLog;

/// Process-wide state for one runtime instance.
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<ConfigStore>,
    pub log: Arc<ServerLog>,
    pub presenter: Arc<dyn Presenter>,
    pub downloads: Arc<DownloadQueue>,
    pub platform: HostPlatform,
    /// Directory the runtime executable lives in.
    pub runtime_dir: PathBuf,
    pub dev_config: Option<DevConfig>,
}

impl RuntimeContext {
    pub fn new(
        config: Arc<ConfigStore>,
        log: Arc<ServerLog>,
        presenter: Arc<dyn Presenter>,
        runtime_dir: PathBuf,
    ) -> Self {
        let downloads = Arc::new(DownloadQueue::new(Arc::clone(&presenter)));
        Self {
            config,
            log,
            presenter,
            downloads,
            platform: HostPlatform::current(),
            runtime_dir,
            dev_config: None,
        }
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_dev_config(mut self, dev_config: Option<DevConfig>) -> Self {
        self.dev_config = dev_config;
        self
    }
}
