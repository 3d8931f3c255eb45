//! Typed errors for the runtime's lower layers.
//!
//! Orchestration code (`launcher`, `main`) folds these into `anyhow` errors or
//! into the two outcomes a user ever sees: proceed or show the error screen.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("port {0} is already in use")]
    AddressInUse(u16),

    #[error("failed to bind 127.0.0.1:{port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to launch {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to the server log")]
    Log(#[from] LogError),
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to write server log {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove server log {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config value")]
    Serialize(#[from] serde_json::Error),

    #[error("could not determine the {0} directory")]
    MissingDir(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("cannot create download file {path}")]
    PathUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write download chunk to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path} with the default handler")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download request failed")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("invalid update feed url")]
    FeedUrl(#[from] url::ParseError),

    #[error("update feed request failed")]
    Http(#[from] reqwest::Error),

    #[error("update feed returned HTTP {0}")]
    Status(u16),

    #[error("update package download failed")]
    Download(#[from] DownloadError),

    #[error("config write failed")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Updater(String),
}
