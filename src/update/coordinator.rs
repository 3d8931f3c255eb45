use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::feed::{self, UpdateCheckParams};
use super::state::{UpdateState, UpdateTransition};
use crate::config::{ConfigStore, keys};
use crate::error::{ConfigError, UpdateError};
use crate::presentation::{MenuState, Presenter};

pub const CHECK_FAILED_MESSAGE: &str = "Unable to check for updates. Please try again later.";

/// Channel updaters report transitions on.
pub type TransitionSender = mpsc::UnboundedSender<UpdateTransition>;

/// Platform update mechanism.
pub trait Updater: Send + Sync {
    /// Point the updater at `feed` and start a check in the background.
    ///
    /// Everything that happens afterwards is reported on `events`.
    fn start_check(&self, feed: Url, events: TransitionSender) -> Result<(), UpdateError>;

    /// Install a downloaded update.
    fn install(&self) -> Result<(), UpdateError> {
        Err(UpdateError::Updater("installing updates is not supported here".to_string()))
    }
}

/// Where the running backend can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub base_url: String,
    pub session_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRequest {
    /// Parameters incomplete; try again once the caller has them.
    Skipped,
    /// No OS update mechanism on this host.
    Unsupported,
    Started(Url),
    /// Logged and surfaced as a notification.
    Failed,
}

/// Owns the persisted update flags and keeps the menu in step with them.
pub struct UpdateCoordinator {
    config: Arc<ConfigStore>,
    presenter: Arc<dyn Presenter>,
    updater: Arc<dyn Updater>,
    supports_auto_update: Box<dyn Fn() -> bool + Send + Sync>,
    server: ServerEndpoint,
    os_arch: &'static str,
    events: TransitionSender,
}

impl UpdateCoordinator {
    /// Build a coordinator and the receiving end of its transition channel;
    /// pass the receiver to [`UpdateCoordinator::run`].
    pub fn new(
        config: Arc<ConfigStore>,
        presenter: Arc<dyn Presenter>,
        updater: Arc<dyn Updater>,
        server: ServerEndpoint,
    ) -> (Self, mpsc::UnboundedReceiver<UpdateTransition>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            config,
            presenter,
            updater,
            supports_auto_update: Box::new(|| cfg!(target_os = "macos")),
            server,
            os_arch: crate::platform::os_arch(),
            events,
        };
        (coordinator, rx)
    }

    /// Replace the "OS update mechanism available" capability check.
    pub fn with_capability(mut self, supports: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.supports_auto_update = Box::new(supports);
        self
    }

    pub fn with_os_arch(mut self, os_arch: &'static str) -> Self {
        self.os_arch = os_arch;
        self
    }

    pub fn supports_auto_update(&self) -> bool {
        (self.supports_auto_update)()
    }

    pub fn state(&self) -> UpdateState {
        UpdateState {
            update_downloading: self.config.get(keys::UPDATE_DOWNLOADING, false),
            update_downloaded: self.config.get(keys::UPDATE_DOWNLOADED, false),
            auto_update_enabled: self.config.get(keys::AUTO_UPDATE_ENABLED, true),
        }
    }

    pub fn menu_state(&self) -> MenuState {
        MenuState::new(self.state(), self.supports_auto_update())
    }

    pub fn rebuild_menu(&self) {
        self.presenter.rebuild_menu(&self.menu_state());
    }

    /// Persist the flags `transition` sets, then rebuild the menu.
    ///
    /// The menu is built from the new state even when the write fails.
    pub fn apply_transition(&self, transition: UpdateTransition) -> Result<UpdateState, ConfigError> {
        log::info!("Update transition: {transition}");
        let next = transition.apply(self.state());
        let (downloading, downloaded) = transition.flags();
        let writes = [
            downloading.map(|v| (keys::UPDATE_DOWNLOADING, Value::Bool(v))),
            downloaded.map(|v| (keys::UPDATE_DOWNLOADED, Value::Bool(v))),
        ];
        let written = self.config.set_many(writes.into_iter().flatten());
        self.presenter
            .rebuild_menu(&MenuState::new(next, self.supports_auto_update()));
        written?;
        Ok(next)
    }

    /// Validate `params` and start a platform update check.
    pub fn request_update_check(&self, params: &UpdateCheckParams) -> CheckRequest {
        let Some(request) = params.complete() else {
            log::debug!("Update check skipped: parameters incomplete");
            return CheckRequest::Skipped;
        };
        if !self.supports_auto_update() {
            log::debug!("Update check skipped: no update mechanism on this platform");
            return CheckRequest::Unsupported;
        }

        let started = feed::feed_url(
            &self.server.base_url,
            &self.server.session_key,
            &request,
            self.os_arch,
        )
        .and_then(|url| {
            self.updater.start_check(url.clone(), self.events.clone())?;
            Ok(url)
        });

        match started {
            Ok(url) => {
                log::info!("Checking for updates via {url}");
                CheckRequest::Started(url)
            }
            Err(e) => {
                log::error!("Failed to check for updates: {e:#}");
                self.presenter.notify(CHECK_FAILED_MESSAGE);
                CheckRequest::Failed
            }
        }
    }

    /// Store the auto-update preference; returns whether it changed.
    pub fn set_auto_update_enabled(&self, enabled: bool) -> Result<bool, ConfigError> {
        if self.state().auto_update_enabled == enabled {
            return Ok(false);
        }
        self.config.set(keys::AUTO_UPDATE_ENABLED, enabled)?;
        self.rebuild_menu();
        Ok(true)
    }

    /// Ask the updater to install a downloaded update.
    pub fn restart_to_update(&self) -> Result<(), UpdateError> {
        if !self.state().update_downloaded {
            return Err(UpdateError::Updater("no update has been downloaded".to_string()));
        }
        self.updater.install()
    }

    /// Apply transitions reported by the updater.
    ///
    /// The coordinator holds a sender itself, so this only returns when the
    /// future is dropped.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<UpdateTransition>) {
        while let Some(transition) = events.recv().await {
            if let Err(e) = self.apply_transition(transition) {
                log::error!("Failed to persist update state: {e:#}");
            }
        }
    }

    /// A sender for code that reports transitions directly.
    pub fn events(&self) -> TransitionSender {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::presentation::testing::{Call, RecordingPresenter};

    #[derive(Default)]
    struct FakeUpdater {
        feeds: Mutex<Vec<Url>>,
        fail: bool,
    }

    impl Updater for FakeUpdater {
        fn start_check(&self, feed: Url, _events: TransitionSender) -> Result<(), UpdateError> {
            if self.fail {
                return Err(UpdateError::Updater("feed rejected".to_string()));
            }
            self.feeds.lock().unwrap().push(feed);
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        presenter: Arc<RecordingPresenter>,
        updater: Arc<FakeUpdater>,
        coordinator: UpdateCoordinator,
    }

    fn fixture(updater: FakeUpdater) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("runtime_config.json")).unwrap());
        let presenter = Arc::new(RecordingPresenter::default());
        let updater = Arc::new(updater);
        let (coordinator, _rx) = UpdateCoordinator::new(
            config,
            presenter.clone(),
            updater.clone(),
            ServerEndpoint {
                base_url: "http://127.0.0.1:5050".to_string(),
                session_key: "key".to_string(),
            },
        );
        Fixture {
            _dir: dir,
            presenter,
            updater,
            coordinator: coordinator.with_capability(|| true).with_os_arch("x64"),
        }
    }

    fn rebuilds(presenter: &RecordingPresenter) -> usize {
        presenter.count(|c| matches!(c, Call::Menu(_)))
    }

    fn params() -> UpdateCheckParams {
        UpdateCheckParams {
            auto_update_url: Some("https://ftp.example.org/pgadmin4/v9.1/macos".to_string()),
            upgrade_version: Some("9.1".to_string()),
            upgrade_version_int: Some(90100),
            current_version_int: Some(90000),
            product_name: Some("pgAdmin4".to_string()),
        }
    }

    #[test]
    fn each_transition_persists_and_rebuilds_once() {
        let f = fixture(FakeUpdater::default());

        f.coordinator.apply_transition(UpdateTransition::UpdateAvailable).unwrap();
        assert!(f.coordinator.state().update_downloading);
        let menu = match f.presenter.calls().last() {
            Some(Call::Menu(m)) => *m,
            other => panic!("expected menu rebuild, got {other:?}"),
        };
        assert!(menu.update_downloading);

        f.coordinator.apply_transition(UpdateTransition::UpdateDownloaded).unwrap();
        let state = f.coordinator.apply_transition(UpdateTransition::ErrorClose).unwrap();

        assert!(!state.update_downloading);
        assert!(!state.update_downloaded);
        assert_eq!(rebuilds(&f.presenter), 3);
    }

    #[test]
    fn repeated_transition_still_rebuilds() {
        let f = fixture(FakeUpdater::default());

        f.coordinator.apply_transition(UpdateTransition::UpdateNotAvailable).unwrap();
        f.coordinator.apply_transition(UpdateTransition::UpdateNotAvailable).unwrap();

        assert_eq!(rebuilds(&f.presenter), 2);
    }

    #[test]
    fn auto_update_toggle_is_idempotent() {
        let f = fixture(FakeUpdater::default());
        let current = f.coordinator.state().auto_update_enabled;

        assert!(!f.coordinator.set_auto_update_enabled(current).unwrap());
        assert_eq!(rebuilds(&f.presenter), 0);

        assert!(f.coordinator.set_auto_update_enabled(!current).unwrap());
        assert_eq!(rebuilds(&f.presenter), 1);
        assert_eq!(f.coordinator.state().auto_update_enabled, !current);
    }

    #[test]
    fn incomplete_params_skip_silently() {
        let f = fixture(FakeUpdater::default());
        let mut p = params();
        p.product_name = None;

        assert_eq!(f.coordinator.request_update_check(&p), CheckRequest::Skipped);
        assert!(f.presenter.calls().is_empty());
        assert!(f.updater.feeds.lock().unwrap().is_empty());
    }

    #[test]
    fn complete_params_start_a_check() {
        let f = fixture(FakeUpdater::default());

        let result = f.coordinator.request_update_check(&params());

        let CheckRequest::Started(url) = result else {
            panic!("expected a started check, got {result:?}");
        };
        assert!(url.as_str().ends_with("pgadmin4-9.1-x64.zip/?key=key"));
        assert_eq!(f.updater.feeds.lock().unwrap().len(), 1);
    }

    #[test]
    fn updater_failure_becomes_notification() {
        let f = fixture(FakeUpdater {
            fail: true,
            ..FakeUpdater::default()
        });

        assert_eq!(f.coordinator.request_update_check(&params()), CheckRequest::Failed);
        assert_eq!(
            f.presenter.calls(),
            vec![Call::Notify(CHECK_FAILED_MESSAGE.to_string())]
        );
    }

    #[test]
    fn capability_gates_checks_and_menu() {
        let f = fixture(FakeUpdater::default());
        let coordinator = f.coordinator.with_capability(|| false);

        assert_eq!(coordinator.request_update_check(&params()), CheckRequest::Unsupported);
        assert!(!coordinator.menu_state().auto_update_supported);
    }

    #[tokio::test]
    async fn run_applies_reported_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("runtime_config.json")).unwrap());
        let presenter = Arc::new(RecordingPresenter::default());
        let (coordinator, rx) = UpdateCoordinator::new(
            config,
            presenter.clone(),
            Arc::new(FakeUpdater::default()),
            ServerEndpoint {
                base_url: "http://127.0.0.1:5050".to_string(),
                session_key: "key".to_string(),
            },
        );
        let events = coordinator.events();
        events.send(UpdateTransition::UpdateAvailable).unwrap();
        events.send(UpdateTransition::UpdateDownloaded).unwrap();
        drop(events);

        // The coordinator keeps its own sender, so stop once both are applied.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), coordinator.run(rx)).await;

        let state = coordinator.state();
        assert!(!state.update_downloading);
        assert!(state.update_downloaded);
        assert_eq!(rebuilds(&presenter), 2);
    }
}
