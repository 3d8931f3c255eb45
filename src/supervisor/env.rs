//! Backend environment and interpreter resolution.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::platform::HostPlatform;

pub const PORT_VAR: &str = "PGADMIN_INT_PORT";
pub const KEY_VAR: &str = "PGADMIN_INT_KEY";
pub const SERVER_MODE_VAR: &str = "PGADMIN_SERVER_MODE";

/// Appended to `PATH` on macOS so the bundled Kerberos/libpq lookups succeed.
pub const MACOS_PATH_SUFFIX: &str = "/usr/local/bin";

/// Environment for the backend: `base` plus the runtime's overrides.
///
/// Values stay `OsString` so inherited variables reach the child byte for
/// byte. Sorted so the launch log is stable between runs.
pub fn build_environment<I, K, V>(
    base: I,
    port: u16,
    session_key: &str,
    platform: HostPlatform,
    runtime_dir: &Path,
) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    env.insert(PORT_VAR.into(), port.to_string().into());
    env.insert(KEY_VAR.into(), session_key.into());
    env.insert(SERVER_MODE_VAR.into(), "OFF".into());

    // Windows spells it `Path`; match case-insensitively there.
    let path_key = env
        .keys()
        .find(|k| match platform {
            HostPlatform::Windows => k.eq_ignore_ascii_case("PATH"),
            _ => k.as_os_str() == "PATH",
        })
        .cloned()
        .unwrap_or_else(|| "PATH".into());
    let current = env.get(&path_key).cloned().unwrap_or_default();
    if let Some(adjusted) = adjust_path(&current, platform, runtime_dir) {
        env.insert(path_key, adjusted);
    }

    env
}

/// Platform-specific `PATH` fix-up, `None` when nothing changes.
pub fn adjust_path(current: &OsStr, platform: HostPlatform, runtime_dir: &Path) -> Option<OsString> {
    let sep = platform.path_separator();
    match platform {
        HostPlatform::MacOs => Some(join_path(current, OsStr::new(MACOS_PATH_SUFFIX), sep)),
        HostPlatform::Windows => Some(join_path(runtime_dir.as_os_str(), current, sep)),
        HostPlatform::Linux | HostPlatform::Other => None,
    }
}

fn join_path(first: &OsStr, second: &OsStr, sep: char) -> OsString {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_os_string(),
        (_, true) => first.to_os_string(),
        _ => {
            let mut joined = first.to_os_string();
            joined.push(sep.to_string());
            joined.push(second);
            joined
        }
    }
}

/// Interpreter location inside an installed bundle, relative to the runtime.
pub fn bundled_python(platform: HostPlatform) -> PathBuf {
    match platform {
        HostPlatform::Windows => PathBuf::from("../python/python.exe"),
        HostPlatform::MacOs => {
            PathBuf::from("../../Frameworks/Python.framework/Versions/Current/bin/python3")
        }
        HostPlatform::Linux | HostPlatform::Other => PathBuf::from("../venv/bin/python3"),
    }
}

/// Resolve a configured path against the runtime directory.
///
/// Bare executable names (`python3`) are looked up on `PATH` first.
pub fn resolve_path(runtime_dir: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        return configured.to_path_buf();
    }
    if configured.components().count() == 1
        && let Ok(found) = which::which(configured)
    {
        return found;
    }
    normalize(&runtime_dir.join(configured))
}

// Lexical `..` removal; the bundle layout may not exist yet when logging it.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
