//! Per-run backend log file.
//!
//! Every launch gets its own `pgadmin4.<epoch-millis>.log` under the local app
//! data directory. The supervisor writes the launch environment and the
//! backend's output here; the error screen shows its contents. The file is
//! removed on a clean exit.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::LogError;

/// Append-only log file shared by every component of one run.
#[derive(Debug)]
pub struct ServerLog {
    path: PathBuf,
    // Serialises appends so concurrent stdout/stderr lines never interleave mid-line.
    write_lock: Mutex<()>,
}

impl ServerLog {
    /// Create the log handle for this run inside `dir`.
    ///
    /// The file itself is created lazily by the first `write`.
    pub fn create_in(dir: &Path) -> Self {
        let created = chrono::Utc::now().timestamp_millis();
        Self::at(dir.join(format!("pgadmin4.{created}.log")))
    }

    /// Use an explicit file path (tests, custom layouts).
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one logical entry followed by a newline.
    pub fn write(&self, data: impl AsRef<str>) -> Result<(), LogError> {
        let data = data.as_ref();
        log::debug!("[server-log] {data}");

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{data}").map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Like `write`, but failures only reach the diagnostic log.
    pub fn write_best_effort(&self, data: impl AsRef<str>) {
        if let Err(e) = self.write(data) {
            log::warn!("{e:#}");
        }
    }

    /// Whole file contents, or a readable placeholder when the file is missing.
    pub fn read(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                let msg = format!("Unable to read file {}.", self.path.display());
                log::warn!("{msg} ({e})");
                msg
            }
        }
    }

    /// Delete the log file; a missing file is not an error.
    pub fn remove(&self) -> Result<(), LogError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LogError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::at(dir.path().join("server.log"));

        log.write("first").unwrap();
        log.write("second").unwrap();

        assert_eq!(log.read(), "first\nsecond\n");
    }

    #[test]
    fn file_name_carries_creation_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::create_in(dir.path());
        let name = log.path().file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("pgadmin4."));
        assert!(name.ends_with(".log"));
        let stamp = &name["pgadmin4.".len()..name.len() - ".log".len()];
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[test]
    fn read_of_missing_file_returns_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::at(dir.path().join("missing.log"));

        assert!(log.read().starts_with("Unable to read file"));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::at(dir.path().join("server.log"));
        log.write("x").unwrap();

        log.remove().unwrap();
        log.remove().unwrap();
        assert!(!log.path().exists());
    }
}
