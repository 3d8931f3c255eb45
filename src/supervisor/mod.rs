//! Backend process supervision
//!
//! Spawns the Python application server with the runtime's environment,
//! writes a full description of the launch into the server log, and forwards
//! the child's stdout/stderr into the same log line by line.
//!
//! ## Module Organization
//! - `env`: environment overrides, PATH fix-ups, interpreter resolution
//! - `process`: the `ServerProcess` handle and best-effort termination
//! - `signal`: control markers the backend prints on stderr

pub mod env;
mod process;
mod signal;

pub use process::ServerProcess;
pub use signal::RuntimeSignal;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead};
use tokio::sync::mpsc;

use crate::config::DevConfig;
use crate::error::SupervisorError;
use crate::platform::HostPlatform;
use crate::server_log::ServerLog;

const SEPARATOR: &str = "--------------------------------------------------------";

/// Everything needed to start one backend instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub python: PathBuf,
    pub webapp: PathBuf,
    pub pgadmin_config: PathBuf,
    pub runtime_config: PathBuf,
    /// Directory the runtime runs from; relative bundle paths resolve here.
    pub runtime_dir: PathBuf,
    pub port: u16,
    pub session_key: String,
}

impl LaunchSpec {
    /// Standard bundle layout with a fresh session key, honouring developer
    /// overrides.
    pub fn for_bundle(
        runtime_dir: &Path,
        platform: HostPlatform,
        dev: Option<&DevConfig>,
        runtime_config: &Path,
        port: u16,
    ) -> Self {
        let python = dev
            .and_then(|d| d.python_path.clone())
            .unwrap_or_else(|| env::bundled_python(platform));
        let webapp = dev
            .and_then(|d| d.pgadmin_file.clone())
            .unwrap_or_else(|| PathBuf::from("../web/pgAdmin4.py"));

        Self {
            python: env::resolve_path(runtime_dir, &python),
            webapp: env::resolve_path(runtime_dir, &webapp),
            pgadmin_config: env::resolve_path(runtime_dir, Path::new("../web/config.py")),
            runtime_config: runtime_config.to_path_buf(),
            runtime_dir: runtime_dir.to_path_buf(),
            port,
            session_key: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        vec!["-s".to_string(), self.webapp.display().to_string()]
    }

    pub fn command_line(&self) -> String {
        format!("{} {}", self.python.display(), self.args().join(" "))
    }

    /// Health endpoint for this launch.
    pub fn ping_url(&self) -> String {
        format!(
            "http://127.0.0.1:{}/misc/ping?key={}",
            self.port, self.session_key
        )
    }

    /// Start page the main window loads.
    pub fn start_url(&self) -> String {
        format!("http://127.0.0.1:{}/?key={}", self.port, self.session_key)
    }

    /// Base URL other endpoints (update feed) hang off.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Spawns backend processes and wires their output into the server log.
pub struct Supervisor {
    log: Arc<ServerLog>,
    platform: HostPlatform,
    signals: mpsc::UnboundedSender<RuntimeSignal>,
}

impl Supervisor {
    pub fn new(
        log: Arc<ServerLog>,
        platform: HostPlatform,
        signals: mpsc::UnboundedSender<RuntimeSignal>,
    ) -> Self {
        Self {
            log,
            platform,
            signals,
        }
    }

    #[cfg(test)]
    pub(crate) fn signal_sender(&self) -> mpsc::UnboundedSender<RuntimeSignal> {
        self.signals.clone()
    }

    /// Spawn the backend described by `spec`.
    ///
    /// The environment is the current process environment plus the runtime's
    /// overrides; every variable is written to the server log before the spawn.
    /// A spawn failure is logged and returned, never retried.
    pub fn spawn(&self, spec: &LaunchSpec) -> Result<ServerProcess, SupervisorError> {
        let env = env::build_environment(
            std::env::vars_os(),
            spec.port,
            &spec.session_key,
            self.platform,
            spec.python.parent().unwrap_or(spec.runtime_dir.as_path()),
        );
        self.write_launch_description(spec, &env)?;

        let mut cmd = tokio::process::Command::new(&spec.python);
        cmd.args(spec.args())
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                log::error!("Failed to spawn {}: {source}", spec.python.display());
                self.log.write_best_effort("Failed to launch pgAdmin4. Error:");
                self.log.write_best_effort(source.to_string());
                return Err(SupervisorError::Spawn {
                    command: spec.command_line(),
                    source,
                });
            }
        };

        let pid_str = child.id().map_or("unavailable".to_string(), |p| p.to_string());
        log::info!("pgAdmin server spawned (PID: {pid_str})");

        let stdout_task = child.stdout.take().map(|stdout| {
            let log = Arc::clone(&self.log);
            tokio::spawn(async move {
                forward_lines(stdout, |line| log.write_best_effort(line)).await;
            })
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            let log = Arc::clone(&self.log);
            let signals = self.signals.clone();
            tokio::spawn(async move {
                forward_lines(stderr, |line| match RuntimeSignal::decode(&line) {
                    Some(signal) => {
                        if signals.send(signal).is_err() {
                            log::debug!("No listener for runtime signal {signal:?}");
                        }
                    }
                    None => log.write_best_effort(line),
                })
                .await;
            })
        });

        Ok(ServerProcess::new(child, stdout_task, stderr_task))
    }

    fn write_launch_description(
        &self,
        spec: &LaunchSpec,
        env: &BTreeMap<OsString, OsString>,
    ) -> Result<(), SupervisorError> {
        let log = &self.log;
        log.write("pgAdmin Runtime Environment")?;
        log.write(SEPARATOR)?;
        log.write(format!("Python Path: \"{}\"", spec.python.display()))?;
        log.write(format!(
            "Runtime Config File: \"{}\"",
            spec.runtime_config.display()
        ))?;
        log.write(format!(
            "pgAdmin Config File: \"{}\"",
            spec.pgadmin_config.display()
        ))?;
        log.write(format!("Webapp Path: \"{}\"", spec.webapp.display()))?;
        log.write(format!("pgAdmin Command: \"{}\"", spec.command_line()))?;
        log.write("Environment: ")?;
        for (key, value) in env {
            log.write(format!(
                "  - {}: {}",
                key.to_string_lossy(),
                value.to_string_lossy()
            ))?;
        }
        log.write(format!("{SEPARATOR}\n"))?;
        Ok(())
    }
}

/// Hand each line of `reader` to `on_line` until EOF or a read error.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the stream.
async fn forward_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = tokio::io::BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                on_line(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                log::debug!("Stopped reading backend output: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(python: PathBuf, dir: &Path) -> LaunchSpec {
        LaunchSpec {
            python,
            webapp: dir.join("pgAdmin4.py"),
            pgadmin_config: dir.join("config.py"),
            runtime_config: dir.join("runtime_config.json"),
            runtime_dir: dir.to_path_buf(),
            port: 5050,
            session_key: "session".to_string(),
        }
    }

    #[test]
    fn urls_embed_port_and_session_key() {
        let s = spec(PathBuf::from("python3"), Path::new("/rt"));

        assert_eq!(s.ping_url(), "http://127.0.0.1:5050/misc/ping?key=session");
        assert_eq!(s.start_url(), "http://127.0.0.1:5050/?key=session");
    }

    #[test]
    fn dev_config_overrides_interpreter() {
        let dev = DevConfig {
            python_path: Some(PathBuf::from("/opt/dev/python3")),
            pgadmin_file: None,
        };

        let s = LaunchSpec::for_bundle(
            Path::new("/opt/pgadmin/runtime"),
            HostPlatform::Linux,
            Some(&dev),
            Path::new("/cfg/runtime_config.json"),
            5050,
        );

        assert_eq!(s.python, PathBuf::from("/opt/dev/python3"));
        assert_eq!(s.webapp, PathBuf::from("/opt/pgadmin/web/pgAdmin4.py"));
        assert_eq!(uuid::Uuid::parse_str(&s.session_key).unwrap().get_version_num(), 4);
    }

    #[tokio::test]
    async fn spawn_failure_is_logged_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ServerLog::at(dir.path().join("server.log")));
        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(Arc::clone(&log), HostPlatform::Linux, tx);

        let result = supervisor.spawn(&spec(dir.path().join("no-such-python"), dir.path()));

        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
        let contents = log.read();
        assert!(contents.contains("pgAdmin Runtime Environment"));
        assert!(contents.contains("  - PGADMIN_INT_KEY: session"));
        assert!(contents.contains("Failed to launch pgAdmin4. Error:"));
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_forwarding() {
        let output: &[u8] = b"before\nbad \xff byte\r\nafter\nno newline";
        let mut lines = Vec::new();

        forward_lines(output, |line| lines.push(line)).await;

        assert_eq!(lines, vec!["before", "bad \u{fffd} byte", "after", "no newline"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backend_output_after_invalid_utf8_reaches_the_log() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let fake_python = dir.path().join("fake-python");
        std::fs::write(
            &fake_python,
            "#!/bin/sh\necho first-line\nprintf 'bad \\377 byte\\n'\necho line-after-bad-byte\nprintf 'err \\377\\n' >&2\necho 'Runtime Zoom Out' >&2\nsleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake_python, std::fs::Permissions::from_mode(0o755)).unwrap();
        let log = Arc::new(ServerLog::at(dir.path().join("server.log")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(Arc::clone(&log), HostPlatform::Linux, tx);

        let mut process = supervisor.spawn(&spec(fake_python, dir.path())).unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(signal, Some(RuntimeSignal::ZoomOut));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !log.read().contains("line-after-bad-byte") {
            assert!(tokio::time::Instant::now() < deadline, "output stopped at the bad byte");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let contents = log.read();
        assert!(contents.contains("first-line"));
        assert!(contents.contains("bad \u{fffd} byte"));
        assert!(contents.contains("err \u{fffd}"));

        process.kill().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_forwarded_and_markers_become_signals() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let fake_python = dir.path().join("fake-python");
        std::fs::write(
            &fake_python,
            "#!/bin/sh\necho \"started on $PGADMIN_INT_PORT\"\necho 'Runtime Zoom In' >&2\necho boom >&2\nsleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake_python, std::fs::Permissions::from_mode(0o755)).unwrap();
        let log = Arc::new(ServerLog::at(dir.path().join("server.log")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(Arc::clone(&log), HostPlatform::Linux, tx);

        let mut process = supervisor.spawn(&spec(fake_python, dir.path())).unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(signal, Some(RuntimeSignal::ZoomIn));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !(log.read().contains("started on 5050") && log.read().contains("boom")) {
            assert!(tokio::time::Instant::now() < deadline, "output never reached the log");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!log.read().contains("Runtime Zoom In"));
        assert!(process.is_alive().await);

        process.kill().await;
        assert!(!process.is_alive().await);
        // A second kill finds nothing to do and must not panic.
        process.kill().await;
    }
}
