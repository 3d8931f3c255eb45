//! Launch orchestration.
//!
//! Port selection, backend spawn and health polling run in sequence. Every
//! failure ends in one of two places the user can see: the main window, or
//! the error screen showing the server log. The error screen is shown at most
//! once per launch.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::keys;
use crate::context::RuntimeContext;
use crate::error::PortError;
use crate::health::{self, HealthCheckSession, HealthPoller, HttpProbe, LaunchTiming, PollOutcome};
use crate::port;
use crate::supervisor::{LaunchSpec, RuntimeSignal, ServerProcess, Supervisor};
use crate::update::ServerEndpoint;

pub const PORT_IN_USE_MESSAGE: &str =
    "The port specified is already in use. Please enter a free port number.";

/// Zoom change per zoom in/out request.
pub const ZOOM_STEP: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Backend healthy; the main window was shown at `url`.
    Ready { url: String },
    /// Spawn failure or health timeout; the error screen was shown.
    Failed,
    /// Torn down before the backend became healthy.
    Cancelled,
    /// The configured fixed port is taken; the user was alerted.
    PortUnavailable { port: u16 },
}

/// Drives one backend launch and owns the resulting process.
pub struct Launcher {
    ctx: RuntimeContext,
    supervisor: Supervisor,
    signals: Mutex<Option<mpsc::UnboundedReceiver<RuntimeSignal>>>,
    process: tokio::sync::Mutex<Option<ServerProcess>>,
    launch: Mutex<Option<LaunchSpec>>,
    splash_visible: AtomicBool,
    timeout_override: Option<Duration>,
    cancel: CancellationToken,
}

impl Launcher {
    pub fn new(ctx: RuntimeContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(ctx.log.clone(), ctx.platform, tx);
        Self {
            ctx,
            supervisor,
            signals: Mutex::new(Some(rx)),
            process: tokio::sync::Mutex::new(None),
            launch: Mutex::new(None),
            splash_visible: AtomicBool::new(true),
            timeout_override: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `timeout` instead of the configured connection timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Token that aborts the launch and the signal loop.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Backend address once a launch has spawned it.
    pub fn endpoint(&self) -> Option<ServerEndpoint> {
        self.launch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|spec| ServerEndpoint {
                base_url: spec.base_url(),
                session_key: spec.session_key.clone(),
            })
    }

    /// Start the backend and wait for it to become healthy.
    pub async fn launch(&self) -> Result<LaunchOutcome> {
        let launch_started = Instant::now();
        let presenter = &self.ctx.presenter;
        presenter.set_status(health::STATUS_STARTING);

        // Re-read on every launch; the user may have changed it since.
        let settings = self.ctx.config.snapshot();
        let requested = if settings.fixed_port {
            settings.port_no
        } else {
            0
        };

        let port = match port::acquire(requested).await {
            Ok(port) => port,
            Err(PortError::AddressInUse(port)) => {
                log::error!("Port {port} is already in use");
                presenter.alert(PORT_IN_USE_MESSAGE);
                return Ok(LaunchOutcome::PortUnavailable { port });
            }
            Err(e) => {
                log::error!("{e:#}");
                self.ctx.log.write_best_effort(format!("Failed to acquire a port: {e}"));
                self.fail();
                return Ok(LaunchOutcome::Failed);
            }
        };
        log::info!("Using port {port}");

        let spec = LaunchSpec::for_bundle(
            &self.ctx.runtime_dir,
            self.ctx.platform,
            self.ctx.dev_config.as_ref(),
            self.ctx.config.path(),
            port,
        );
        *self.launch.lock().unwrap_or_else(|e| e.into_inner()) = Some(spec.clone());

        let process = match self.supervisor.spawn(&spec) {
            Ok(process) => process,
            Err(e) => {
                log::error!("{e:#}");
                self.fail();
                return Ok(LaunchOutcome::Failed);
            }
        };
        let spawned = Instant::now();
        *self.process.lock().await = Some(process);
        presenter.set_status(health::STATUS_WAITING);

        let timeout = self
            .timeout_override
            .unwrap_or_else(|| Duration::from_secs(settings.connection_timeout));
        let probe = HttpProbe::new(spec.ping_url(), timeout).context("Failed to build HTTP client")?;
        let poller = HealthPoller::new(probe, presenter.clone());
        let session = HealthCheckSession::new(spec.ping_url(), spawned, timeout);
        let timing = LaunchTiming {
            launch_started,
            spawned,
        };

        match poller.poll_until_healthy(&session, timing, &self.cancel).await {
            PollOutcome::Healthy { .. } => {
                let url = spec.start_url();
                if self.splash_visible.swap(false, Ordering::SeqCst) {
                    presenter.show_main_window(&url);
                }
                Ok(LaunchOutcome::Ready { url })
            }
            PollOutcome::TimedOut { .. } => {
                self.ctx.log.write_best_effort(format!(
                    "pgAdmin did not respond within {} seconds.",
                    timeout.as_secs()
                ));
                self.fail();
                Ok(LaunchOutcome::Failed)
            }
            PollOutcome::Cancelled => Ok(LaunchOutcome::Cancelled),
        }
    }

    // Error screen with the server log, only while the splash is still up.
    fn fail(&self) {
        if self.splash_visible.swap(false, Ordering::SeqCst) {
            self.ctx.presenter.show_error(&self.ctx.log.read());
        } else {
            log::debug!("Launch failure after the splash was dismissed, ignoring");
        }
    }

    /// Route backend control markers to the presenter until cancelled.
    ///
    /// Zoom requests also update the persisted zoom level. Only the first
    /// call receives signals.
    pub async fn run_signal_loop(&self) {
        let rx = self.signals.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut rx) = rx else {
            log::warn!("Signal loop already running");
            return;
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                signal = rx.recv() => match signal {
                    Some(signal) => self.dispatch_signal(signal),
                    None => break,
                },
            }
        }
    }

    fn dispatch_signal(&self, signal: RuntimeSignal) {
        let current = self.ctx.config.get(keys::ZOOM_LEVEL, 0.0_f64);
        if let Some(zoom) = zoom_after(current, signal) {
            log::info!("Zoom level {current} -> {zoom}");
            if let Err(e) = self.ctx.config.set(keys::ZOOM_LEVEL, zoom) {
                log::warn!("Failed to store zoom level: {e:#}");
            }
        }
        self.ctx.presenter.handle_signal(signal);
    }

    /// Cancel polling, stop the backend and delete this run's log.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(mut process) = self.process.lock().await.take() {
            log::info!("Stopping pgAdmin server (PID: {:?})", process.pid());
            process.kill().await;
        }
        if let Err(e) = self.ctx.log.remove() {
            log::warn!("{e:#}");
        }
    }
}

/// Zoom level after `signal`, `None` when it is not a zoom request.
pub fn zoom_after(current: f64, signal: RuntimeSignal) -> Option<f64> {
    match signal {
        RuntimeSignal::ZoomIn => Some(current + ZOOM_STEP),
        RuntimeSignal::ZoomOut => Some(current - ZOOM_STEP),
        RuntimeSignal::ActualSize => Some(0.0),
        _ => None,
    }
}
