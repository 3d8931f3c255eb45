//! Headless presenter for running the runtime from a terminal.
//!
//! The splash screen becomes a spinner, the download indicator a progress bar,
//! and the main window is opened in the default browser.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::menu::{self, HotKeyHost, MenuState, ShortcutRegistry};
use super::{Presenter, Progress};
use crate::platform::HostPlatform;
use crate::supervisor::RuntimeSignal;

const PROGRESS_SCALE: u64 = 1000;

/// Terminals have no global hotkeys; accelerators are only recorded.
#[derive(Debug, Default)]
pub struct TerminalHotKeys;

impl HotKeyHost for TerminalHotKeys {
    fn register(&mut self, accelerator: &str) -> Result<(), String> {
        log::trace!("register shortcut {accelerator}");
        Ok(())
    }

    fn unregister(&mut self, accelerator: &str) {
        log::trace!("unregister shortcut {accelerator}");
    }
}

pub struct TerminalPresenter {
    multi: MultiProgress,
    splash: ProgressBar,
    downloads: Mutex<Option<ProgressBar>>,
    shortcuts: Mutex<ShortcutRegistry<TerminalHotKeys>>,
    platform: HostPlatform,
    open_browser: bool,
}

impl TerminalPresenter {
    pub fn new(open_browser: bool) -> Self {
        let multi = MultiProgress::new();
        let splash = multi.add(ProgressBar::new_spinner());
        splash.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            splash,
            downloads: Mutex::new(None),
            shortcuts: Mutex::new(ShortcutRegistry::new(TerminalHotKeys)),
            platform: HostPlatform::current(),
            open_browser,
        }
    }

    fn download_bar(&self, indeterminate: bool) -> ProgressBar {
        let mut slot = self.downloads.lock().unwrap_or_else(|e| e.into_inner());
        let bar = slot
            .get_or_insert_with(|| self.multi.add(ProgressBar::new(PROGRESS_SCALE)))
            .clone();
        let template = if indeterminate {
            "{spinner} downloading..."
        } else {
            "[{bar:40}] {percent}% downloading"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style);
        }
        bar
    }
}

impl Presenter for TerminalPresenter {
    fn set_status(&self, text: &str) {
        self.splash.set_message(text.to_string());
    }

    fn show_main_window(&self, url: &str) {
        self.splash.finish_and_clear();
        println!("pgAdmin 4 is available at {url}");
        if self.open_browser
            && let Err(e) = opener::open_browser(url)
        {
            log::warn!("Failed to open browser: {e}");
        }
    }

    fn show_error(&self, log: &str) {
        self.splash.finish_and_clear();
        eprintln!("The pgAdmin 4 server could not be contacted:\n");
        eprintln!("{log}");
    }

    fn alert(&self, message: &str) {
        self.splash.suspend(|| eprintln!("{message}"));
    }

    fn notify(&self, message: &str) {
        self.splash.suspend(|| println!("{message}"));
    }

    fn rebuild_menu(&self, state: &MenuState) {
        let menus = menu::build_menu(state, self.platform);
        for m in &menus {
            let labels: Vec<_> = m
                .items
                .iter()
                .map(|i| if i.enabled { i.label.to_string() } else { format!("({})", i.label) })
                .collect();
            log::debug!("menu {}: {}", m.title, labels.join(", "));
        }
        self.shortcuts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(&menu::shortcuts(self.platform));
    }

    fn set_badge(&self, count: usize) {
        log::debug!("badge: {count}");
    }

    fn clear_badge(&self) {
        log::debug!("badge cleared");
    }

    fn set_progress(&self, progress: Progress) {
        match progress {
            Progress::None => self.clear_progress(),
            Progress::Indeterminate => self.download_bar(true).tick(),
            Progress::Fraction(f) => {
                let position = (f.clamp(0.0, 1.0) * PROGRESS_SCALE as f64) as u64;
                self.download_bar(false).set_position(position);
            }
        }
    }

    fn clear_progress(&self) {
        if let Some(bar) = self
            .downloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            bar.finish_and_clear();
        }
    }

    fn handle_signal(&self, signal: RuntimeSignal) {
        match signal {
            RuntimeSignal::OpenConfiguration => {
                self.notify("Use `pgadmin4-runtime config set <key> <value>` to change runtime settings.")
            }
            RuntimeSignal::OpenViewLog => {
                self.notify("The server log is written to the pgadmin local data directory.")
            }
            other => log::info!("runtime signal: {other:?}"),
        }
    }
}
