//! Window/menu presentation seam
//!
//! The runtime never draws anything itself. Everything visible goes through the
//! `Presenter` trait: launch status text, the main window, the error screen,
//! the application menu, the dock badge and the progress indicator.
//!
//! ## Module Organization
//! - `menu`: menu model built from update state, plus global shortcut registry
//! - `terminal`: headless presenter used by the `pgadmin4-runtime` binary

pub mod menu;
pub mod terminal;

pub use menu::{MenuState, ShortcutRegistry};
pub use terminal::TerminalPresenter;

use crate::supervisor::RuntimeSignal;

/// Value shown by the progress indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Nothing in flight; the indicator is hidden.
    None,
    /// At least one item has no known size.
    Indeterminate,
    /// Mean completion in `[0, 1]`.
    Fraction(f64),
}

impl Progress {
    /// Out-of-range value native progress bars treat as "indeterminate".
    pub const INDETERMINATE_SENTINEL: f64 = 2.0;

    /// Value handed to native progress APIs: `-1` hides, `2` is indeterminate.
    pub fn as_native(self) -> f64 {
        match self {
            Progress::None => -1.0,
            Progress::Indeterminate => Self::INDETERMINATE_SENTINEL,
            Progress::Fraction(f) => f,
        }
    }
}

/// Everything the runtime asks of the hosting UI.
///
/// Implementations must be cheap and idempotent: `rebuild_menu` and
/// `set_progress` may be called many times per second.
pub trait Presenter: Send + Sync {
    /// Splash screen status line.
    fn set_status(&self, text: &str);

    /// The backend is healthy; show the application at `url`.
    fn show_main_window(&self, url: &str);

    /// Fatal launch failure; `log` is the accumulated server log.
    fn show_error(&self, log: &str);

    /// Blocking user-facing message (e.g. port already in use).
    fn alert(&self, message: &str);

    /// Non-blocking notification (e.g. update check failed).
    fn notify(&self, message: &str);

    fn rebuild_menu(&self, state: &MenuState);

    fn set_badge(&self, count: usize);

    fn clear_badge(&self);

    fn set_progress(&self, progress: Progress);

    fn clear_progress(&self);

    /// Control request decoded from the backend's stderr.
    fn handle_signal(&self, signal: RuntimeSignal) {
        log::debug!("Unhandled runtime signal: {signal:?}");
    }
}
