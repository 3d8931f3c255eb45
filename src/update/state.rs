use std::fmt;
use std::str::FromStr;

/// Persisted auto-update flags read by menu construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateState {
    pub update_downloading: bool,
    pub update_downloaded: bool,
    pub auto_update_enabled: bool,
}

/// The four events an updater can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTransition {
    UpdateAvailable,
    UpdateNotAvailable,
    UpdateDownloaded,
    ErrorClose,
}

impl UpdateTransition {
    pub const ALL: [UpdateTransition; 4] = [
        UpdateTransition::UpdateAvailable,
        UpdateTransition::UpdateNotAvailable,
        UpdateTransition::UpdateDownloaded,
        UpdateTransition::ErrorClose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UpdateTransition::UpdateAvailable => "update-available",
            UpdateTransition::UpdateNotAvailable => "update-not-available",
            UpdateTransition::UpdateDownloaded => "update-downloaded",
            UpdateTransition::ErrorClose => "error-close",
        }
    }

    /// New `(update_downloading, update_downloaded)`; `None` leaves a flag as is.
    pub fn flags(self) -> (Option<bool>, Option<bool>) {
        match self {
            UpdateTransition::UpdateAvailable => (Some(true), None),
            UpdateTransition::UpdateNotAvailable => (Some(false), None),
            UpdateTransition::UpdateDownloaded => (Some(false), Some(true)),
            UpdateTransition::ErrorClose => (Some(false), Some(false)),
        }
    }

    pub fn apply(self, state: UpdateState) -> UpdateState {
        let (downloading, downloaded) = self.flags();
        UpdateState {
            update_downloading: downloading.unwrap_or(state.update_downloading),
            update_downloaded: downloaded.unwrap_or(state.update_downloaded),
            ..state
        }
    }
}

impl fmt::Display for UpdateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown update transition '{0}'")]
pub struct UnknownTransition(pub String);

impl FromStr for UpdateTransition {
    type Err = UnknownTransition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| UnknownTransition(s.to_string()))
    }
}
