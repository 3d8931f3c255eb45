use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Grace period between SIGTERM and a hard kill.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);
const KILL_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to the spawned backend server.
///
/// Owns the child and the tasks forwarding its output into the server log.
pub struct ServerProcess {
    pid: Option<u32>,
    child: Arc<Mutex<Option<Child>>>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl ServerProcess {
    pub(super) fn new(
        child: Child,
        stdout_task: Option<JoinHandle<()>>,
        stderr_task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(Some(child))),
            stdout_task,
            stderr_task,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` while the child has not exited.
    pub async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Best-effort termination.
    ///
    /// Sends SIGTERM (Unix), waits briefly, then kills. Every failure is logged
    /// as a warning and swallowed; a process that already exited is fine.
    pub async fn kill(&mut self) {
        let child = self.child.lock().await.take();
        if let Some(mut child) = child
            && let Err(e) = terminate(&mut child, self.pid).await
        {
            log::warn!("Failed to kill server process: {e:#}");
        }

        if let Some(task) = self.stdout_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>) -> anyhow::Result<()> {
    if let Some(status) = child.try_wait()? {
        log::info!("Server process already exited: {status}");
        return Ok(());
    }

    #[cfg(unix)]
    {
        if let Some(pid_u32) = pid {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(pid_u32 as i32), Signal::SIGTERM) {
                Ok(()) => {
                    log::info!("Sent SIGTERM to server (PID: {pid_u32})");
                    if wait_for_exit(child, GRACEFUL_TIMEOUT).await? {
                        return Ok(());
                    }
                    log::warn!(
                        "Server did not exit within {}s, escalating to SIGKILL",
                        GRACEFUL_TIMEOUT.as_secs()
                    );
                }
                Err(e) => log::warn!("Failed SIGTERM to server: {e}"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    child.start_kill()?;
    if wait_for_exit(child, KILL_TIMEOUT).await? {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "server did not terminate after {}s",
            KILL_TIMEOUT.as_secs()
        ))
    }
}

/// Poll `try_wait` until the child exits or `timeout` elapses.
async fn wait_for_exit(child: &mut Child, timeout: Duration) -> anyhow::Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            log::info!("Server process exited: {status}");
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
