//! Backend health polling.
//!
//! After the backend is spawned the runtime probes its ping endpoint once per
//! second until it answers or the configured wall-clock deadline passes. The
//! number of attempts is unbounded; only elapsed time ends the loop. At most
//! one probe is ever in flight: a tick that lands while a probe is outstanding
//! is skipped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::presentation::Presenter;

/// Fixed delay between probe attempts.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub const STATUS_STARTING: &str = "Starting pgAdmin 4...";
pub const STATUS_WAITING: &str = "Waiting for pgAdmin 4 to start...";
pub const STATUS_STARTED: &str = "pgAdmin 4 started";

/// One health check attempt.
pub trait Probe: Send + Sync {
    /// Resolve `Ok` when the backend reports healthy.
    fn probe(&self) -> impl Future<Output = Result<(), String>> + Send;
}

/// `GET` against the backend's ping URL; any 2xx is healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// `max_wait` caps a single request so a hung connection still reaches
    /// the deadline check; pass the launch timeout.
    pub fn new(url: impl Into<String>, max_wait: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(max_wait).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Probe for HttpProbe {
    async fn probe(&self) -> Result<(), String> {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("Health check returned status {}", response.status())),
            Err(e) => Err(format!("Health check failed: {e}")),
        }
    }
}

/// Status line changes shown while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowStatus {
    TakingLonger,
    AlmostThere,
}

impl SlowStatus {
    pub fn text(self) -> &'static str {
        match self {
            SlowStatus::TakingLonger => "Taking longer than usual...",
            SlowStatus::AlmostThere => "Almost there...",
        }
    }
}

/// What a failed probe means at a given elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling; optionally update the status line.
    Continue(Option<SlowStatus>),
    TimedOut,
}

/// Classify a failed probe `elapsed` into a launch allowed `timeout`.
///
/// Below half the timeout nothing visible changes; from half to two thirds
/// the user is told it is taking longer; past two thirds that it is almost
/// there; at the timeout the launch has failed.
pub fn assess(elapsed: Duration, timeout: Duration) -> Verdict {
    if elapsed >= timeout {
        Verdict::TimedOut
    } else if elapsed >= timeout * 2 / 3 {
        Verdict::Continue(Some(SlowStatus::AlmostThere))
    } else if elapsed >= timeout / 2 {
        Verdict::Continue(Some(SlowStatus::TakingLonger))
    } else {
        Verdict::Continue(None)
    }
}

/// Timing of one polling run.
#[derive(Debug, Clone)]
pub struct HealthCheckSession {
    pub url: String,
    pub started: Instant,
    pub deadline: Instant,
    pub slow_at: Instant,
    pub almost_at: Instant,
}

impl HealthCheckSession {
    pub fn new(url: impl Into<String>, started: Instant, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            started,
            deadline: started + timeout,
            slow_at: started + timeout / 2,
            almost_at: started + timeout * 2 / 3,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.deadline - self.started
    }

    pub fn assess_at(&self, now: Instant) -> Verdict {
        assess(now.saturating_duration_since(self.started), self.timeout())
    }
}

/// When the launch started and when the process was spawned.
#[derive(Debug, Clone, Copy)]
pub struct LaunchTiming {
    pub launch_started: Instant,
    pub spawned: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Healthy { attempts: u32 },
    TimedOut { attempts: u32 },
    Cancelled,
}

type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// Drives `Probe` attempts on a fixed tick until healthy, timed out or cancelled.
pub struct HealthPoller<P> {
    probe: P,
    presenter: Arc<dyn Presenter>,
    tick: Duration,
}

impl<P: Probe> HealthPoller<P> {
    pub fn new(probe: P, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            probe,
            presenter,
            tick: TICK_INTERVAL,
        }
    }

    /// Override the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Poll until the backend is healthy or `session`'s deadline passes.
    ///
    /// Cancelling `cancel` stops the ticker; an in-flight probe is dropped
    /// with it.
    pub async fn poll_until_healthy(
        &self,
        session: &HealthCheckSession,
        timing: LaunchTiming,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let mut ticker = tokio::time::interval_at(session.started, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<ProbeFuture<'_>> = None;
        let mut last_status: Option<SlowStatus> = None;
        let mut attempts = 0u32;

        log::info!(
            "Waiting up to {}s for {}",
            session.timeout().as_secs(),
            session.url
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("Health check cancelled after {attempts} attempts");
                    return PollOutcome::Cancelled;
                }

                result = drive(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    match result {
                        Ok(()) => {
                            self.presenter.set_status(STATUS_STARTED);
                            log_launch_times(timing, Instant::now());
                            return PollOutcome::Healthy { attempts };
                        }
                        Err(e) => {
                            log::debug!("Probe {attempts} failed: {e}");
                            match session.assess_at(Instant::now()) {
                                Verdict::TimedOut => {
                                    log::error!(
                                        "pgAdmin server did not respond within {}s ({attempts} attempts). Last error: {e}",
                                        session.timeout().as_secs()
                                    );
                                    return PollOutcome::TimedOut { attempts };
                                }
                                Verdict::Continue(Some(status)) if last_status != Some(status) => {
                                    last_status = Some(status);
                                    self.presenter.set_status(status.text());
                                }
                                Verdict::Continue(_) => {}
                            }
                        }
                    }
                }

                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        log::trace!("Probe still outstanding, skipping tick");
                        continue;
                    }
                    attempts += 1;
                    in_flight = Some(Box::pin(self.probe.probe()));
                }
            }
        }
    }
}

async fn drive(slot: &mut Option<ProbeFuture<'_>>) -> Result<(), String> {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

fn log_launch_times(timing: LaunchTiming, healthy_at: Instant) {
    let spawn = timing.spawned.saturating_duration_since(timing.launch_started);
    let probe = healthy_at.saturating_duration_since(timing.spawned);
    let total = healthy_at.saturating_duration_since(timing.launch_started);
    log::info!(
        "pgAdmin server is up. Spawn time: {:.2}s, health check time: {:.2}s, total launch time: {:.2}s",
        spawn.as_secs_f64(),
        probe.as_secs_f64(),
        total.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use super::*;
    use crate::presentation::testing::{Call, RecordingPresenter};

    const TIMEOUT: Duration = Duration::from_secs(180);

    /// Fails `failures` times, each attempt taking `latency`, then succeeds.
    struct ScriptedProbe {
        latency: Duration,
        failures: u32,
        calls: AtomicU32,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(latency: Duration, failures: u32) -> Self {
            Self {
                latency,
                failures,
                calls: AtomicU32::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    impl Probe for &ScriptedProbe {
        async fn probe(&self) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if n > self.failures {
                Ok(())
            } else {
                Err("connection refused".to_string())
            }
        }
    }

    fn timing() -> LaunchTiming {
        let now = Instant::now();
        LaunchTiming {
            launch_started: now,
            spawned: now,
        }
    }

    #[test]
    fn status_thresholds_for_default_timeout() {
        assert_eq!(assess(Duration::from_secs(0), TIMEOUT), Verdict::Continue(None));
        assert_eq!(
            assess(Duration::from_secs(95), TIMEOUT),
            Verdict::Continue(Some(SlowStatus::TakingLonger))
        );
        assert_eq!(
            assess(Duration::from_secs(125), TIMEOUT),
            Verdict::Continue(Some(SlowStatus::AlmostThere))
        );
        assert_eq!(assess(Duration::from_secs(181), TIMEOUT), Verdict::TimedOut);
        assert_eq!(assess(TIMEOUT, TIMEOUT), Verdict::TimedOut);
    }

    #[test]
    fn session_thresholds_are_half_and_two_thirds() {
        let start = Instant::now();
        let session = HealthCheckSession::new("http://x", start, TIMEOUT);

        assert_eq!(session.slow_at - start, Duration::from_secs(90));
        assert_eq!(session.almost_at - start, Duration::from_secs(120));
        assert_eq!(session.deadline - start, TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_probe_times_out_once_with_status_progression() {
        let probe = ScriptedProbe::new(Duration::from_millis(10), u32::MAX);
        let presenter = Arc::new(RecordingPresenter::default());
        let poller = HealthPoller::new(&probe, presenter.clone());
        let session = HealthCheckSession::new("http://127.0.0.1:1/misc/ping", Instant::now(), TIMEOUT);

        let outcome = poller
            .poll_until_healthy(&session, timing(), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
        let statuses: Vec<_> = presenter
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Status(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec!["Taking longer than usual...", "Almost there..."]);
        // No probes run after the deadline verdict.
        let calls_at_timeout = probe.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls_at_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_never_overlap() {
        // Each probe outlives three ticks.
        let probe = ScriptedProbe::new(Duration::from_millis(3500), 4);
        let presenter = Arc::new(RecordingPresenter::default());
        let poller = HealthPoller::new(&probe, presenter.clone());
        let session = HealthCheckSession::new("http://x", Instant::now(), TIMEOUT);

        let outcome = poller
            .poll_until_healthy(&session, timing(), &CancellationToken::new())
            .await;

        assert_eq!(outcome, PollOutcome::Healthy { attempts: 5 });
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            presenter.calls().last(),
            Some(&Call::Status(STATUS_STARTED.to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_on_first_probe() {
        let probe = ScriptedProbe::new(Duration::ZERO, 0);
        let presenter = Arc::new(RecordingPresenter::default());
        let poller = HealthPoller::new(&probe, presenter.clone());
        let session = HealthCheckSession::new("http://x", Instant::now(), TIMEOUT);

        let outcome = poller
            .poll_until_healthy(&session, timing(), &CancellationToken::new())
            .await;

        assert_eq!(outcome, PollOutcome::Healthy { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling_without_error() {
        let probe = ScriptedProbe::new(Duration::from_millis(10), u32::MAX);
        let presenter = Arc::new(RecordingPresenter::default());
        let poller = HealthPoller::new(&probe, presenter.clone());
        let session = HealthCheckSession::new("http://x", Instant::now(), TIMEOUT);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let outcome = poller.poll_until_healthy(&session, timing(), &cancel).await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(probe.calls.load(Ordering::SeqCst) <= 6);
    }
}
