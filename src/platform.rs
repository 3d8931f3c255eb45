//! Host platform detection.
//!
//! Platform differences (PATH fixes, interpreter layout, shortcut modifiers,
//! update package names) are expressed as functions of a `HostPlatform` value
//! instead of scattered `cfg` checks, so each variant is testable on any host.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl HostPlatform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "macos")] {
                HostPlatform::MacOs
            } else if #[cfg(target_os = "windows")] {
                HostPlatform::Windows
            } else if #[cfg(target_os = "linux")] {
                HostPlatform::Linux
            } else {
                HostPlatform::Other
            }
        }
    }

    /// Separator used in `PATH`.
    pub fn path_separator(self) -> char {
        match self {
            HostPlatform::Windows => ';',
            _ => ':',
        }
    }
}

/// Architecture label used in update package names (`x64`, `arm64`, ...).
pub fn os_arch() -> &'static str {
    arch_label(std::env::consts::ARCH)
}

fn arch_label(arch: &'static str) -> &'static str {
    match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_labels_follow_package_naming() {
        assert_eq!(arch_label("x86_64"), "x64");
        assert_eq!(arch_label("aarch64"), "arm64");
        assert_eq!(arch_label("riscv64"), "riscv64");
    }

    #[test]
    fn windows_uses_semicolon_in_path() {
        assert_eq!(HostPlatform::Windows.path_separator(), ';');
        assert_eq!(HostPlatform::MacOs.path_separator(), ':');
    }
}
