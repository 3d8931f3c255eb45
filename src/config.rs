use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// File name of the persisted runtime configuration.
pub const CONFIG_FILE_NAME: &str = "runtime_config.json";

/// Developer override file looked up in the working directory.
pub const DEV_CONFIG_FILE_NAME: &str = "dev_config.json";

/// Persisted key names. Some are camelCase, some snake_case; both are on-disk
/// formats shared with the web application and must not change.
pub mod keys {
    pub const FIXED_PORT: &str = "fixedPort";
    pub const PORT_NO: &str = "portNo";
    pub const CONNECTION_TIMEOUT: &str = "connectionTimeout";
    pub const OPEN_DOCS_IN_BROWSER: &str = "openDocsInBrowser";
    pub const ZOOM_LEVEL: &str = "zoomLevel";
    pub const BOUNDS: &str = "bounds";
    pub const UPDATE_DOWNLOADING: &str = "update_downloading";
    pub const UPDATE_DOWNLOADED: &str = "update_downloaded";
    pub const AUTO_UPDATE_ENABLED: &str = "auto_update_enabled";
}

pub const DEFAULT_PORT: u16 = 5050;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 180;

/// Main window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Typed view of the runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub fixed_port: bool,
    pub port_no: u16,
    pub connection_timeout: u64,
    pub open_docs_in_browser: bool,
    pub zoom_level: f64,
    pub update_downloading: bool,
    pub update_downloaded: bool,
    pub auto_update_enabled: bool,
    pub bounds: Option<Bounds>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fixed_port: false,
            port_no: DEFAULT_PORT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_SECS,
            open_docs_in_browser: false,
            zoom_level: 0.0,
            update_downloading: false,
            update_downloaded: false,
            auto_update_enabled: true,
            bounds: None,
        }
    }
}

/// Values written to a fresh config file.
fn default_data() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(keys::FIXED_PORT.into(), Value::Bool(false));
    data.insert(keys::PORT_NO.into(), Value::from(DEFAULT_PORT));
    data.insert(
        keys::CONNECTION_TIMEOUT.into(),
        Value::from(DEFAULT_CONNECTION_TIMEOUT_SECS),
    );
    data.insert(keys::ZOOM_LEVEL.into(), Value::from(0));
    data
}

/// Durable key/value store backed by `runtime_config.json`.
///
/// Loaded once on start; every `set` writes the whole file back. Concurrent
/// writers are last-writer-wins per key.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl ConfigStore {
    /// Load `path`, writing defaults when the file is missing.
    ///
    /// An unreadable or invalid file yields an empty store rather than an
    /// error so the runtime still launches with built-in defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        if !path.exists() {
            log::warn!("Unable to read file {} not found.", path.display());
            let store = Self {
                path,
                data: Mutex::new(default_data()),
            };
            store.save()?;
            return Ok(store);
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    log::warn!("Invalid JSON in {}, ignoring stored values", path.display());
                    Map::new()
                }
            },
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Open the store at its per-user location.
    pub fn open_default() -> Result<Self, ConfigError> {
        let dir = app_data_dir()?;
        Self::open(dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `key`, falling back to `default` when absent or of the wrong type.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(default)
    }

    /// Store `value` under `key` and write the file.
    ///
    /// `null` and the empty string delete the key.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value)?;
        {
            let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
            if is_empty_value(&value) {
                data.remove(key);
            } else {
                data.insert(key.to_string(), value);
            }
        }
        self.save()
    }

    /// Merge several keys in one write.
    pub fn set_many<I>(&self, entries: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        {
            let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
            for (key, value) in entries {
                data.insert(key.to_string(), value);
            }
        }
        self.save()
    }

    /// Typed snapshot, each key read on its own so one bad value only
    /// resets that key to its default.
    pub fn snapshot(&self) -> RuntimeConfig {
        let d = RuntimeConfig::default();
        RuntimeConfig {
            fixed_port: self.get(keys::FIXED_PORT, d.fixed_port),
            port_no: self.get(keys::PORT_NO, d.port_no),
            connection_timeout: self.get(keys::CONNECTION_TIMEOUT, d.connection_timeout),
            open_docs_in_browser: self.get(keys::OPEN_DOCS_IN_BROWSER, d.open_docs_in_browser),
            zoom_level: self.get(keys::ZOOM_LEVEL, d.zoom_level),
            update_downloading: self.get(keys::UPDATE_DOWNLOADING, d.update_downloading),
            update_downloaded: self.get(keys::UPDATE_DOWNLOADED, d.update_downloaded),
            auto_update_enabled: self.get(keys::AUTO_UPDATE_ENABLED, d.auto_update_enabled),
            bounds: self.get(keys::BOUNDS, d.bounds),
        }
    }

    /// Raw JSON of the whole store.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(to_json_4(&Value::Object(data.clone()))?)
    }

    fn save(&self) -> Result<(), ConfigError> {
        let body = self.to_pretty_json()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, body).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

// Four-space indentation, matching what the web application writes.
fn to_json_4(value: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Roaming per-user directory for configuration.
///
/// - Windows: `%APPDATA%\pgadmin`
/// - macOS: `~/Library/Preferences/pgadmin`
/// - Linux: `$XDG_CONFIG_HOME/pgadmin` or `~/.config/pgadmin`
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "macos")] {
            let base = dirs::preference_dir();
        } else {
            let base = dirs::config_dir();
        }
    }
    ensure_dir(base.ok_or(ConfigError::MissingDir("config"))?.join("pgadmin"))
}

/// Local per-user directory for logs.
///
/// - Windows: `%LOCALAPPDATA%\pgadmin`
/// - macOS: `~/Library/Application Support/pgadmin`
/// - Linux: `$XDG_DATA_HOME/pgadmin` or `~/.local/share/pgadmin`
pub fn local_app_data_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_local_dir().ok_or(ConfigError::MissingDir("local data"))?;
    ensure_dir(base.join("pgadmin"))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Write {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Developer overrides for the interpreter and web application paths.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevConfig {
    #[serde(rename = "pythonPath")]
    pub python_path: Option<PathBuf>,
    #[serde(rename = "pgadminFile")]
    pub pgadmin_file: Option<PathBuf>,
}

impl DevConfig {
    /// Load `dev_config.json` if present. Parse errors are logged and ignored.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(cfg) => {
                log::info!("Using developer overrides from {}", path.display());
                Some(cfg)
            }
            Err(e) => {
                log::warn!("Ignoring invalid {}: {e}", path.display());
                None
            }
        }
    }
}
