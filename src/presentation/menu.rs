//! Application menu model and global shortcut registration.

use crate::platform::HostPlatform;
use crate::update::UpdateState;

/// Inputs the menu depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuState {
    pub update_downloading: bool,
    pub update_downloaded: bool,
    pub auto_update_enabled: bool,
    /// Whether the OS update mechanism is available at all.
    pub auto_update_supported: bool,
}

impl MenuState {
    pub fn new(update: UpdateState, auto_update_supported: bool) -> Self {
        Self {
            update_downloading: update.update_downloading,
            update_downloaded: update.update_downloaded,
            auto_update_enabled: update.auto_update_enabled,
            auto_update_supported,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CheckForUpdates,
    RestartToUpdate,
    ToggleAutoUpdate,
    Configure,
    ViewLogs,
    ZoomIn,
    ZoomOut,
    ActualSize,
    ToggleFullScreen,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub label: &'static str,
    pub action: MenuAction,
    pub enabled: bool,
    pub checked: Option<bool>,
    pub accelerator: Option<&'static str>,
}

impl MenuItem {
    fn new(label: &'static str, action: MenuAction) -> Self {
        Self {
            label,
            action,
            enabled: true,
            checked: None,
            accelerator: None,
        }
    }

    fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    fn accelerator(mut self, accelerator: &'static str) -> Self {
        self.accelerator = Some(accelerator);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Menu {
    pub title: &'static str,
    pub items: Vec<MenuItem>,
}

/// A global accelerator bound to a menu action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub accelerator: &'static str,
    pub action: MenuAction,
}

/// Zoom and full screen accelerators for `platform`.
pub fn shortcuts(platform: HostPlatform) -> [Shortcut; 4] {
    match platform {
        HostPlatform::MacOs => [
            Shortcut { accelerator: "Command+Equal", action: MenuAction::ZoomIn },
            Shortcut { accelerator: "Command+Minus", action: MenuAction::ZoomOut },
            Shortcut { accelerator: "Command+0", action: MenuAction::ActualSize },
            Shortcut { accelerator: "Command+Ctrl+F", action: MenuAction::ToggleFullScreen },
        ],
        // F11 is reserved by the embedded browser engine, so full screen uses F10.
        _ => [
            Shortcut { accelerator: "Ctrl+Equal", action: MenuAction::ZoomIn },
            Shortcut { accelerator: "Ctrl+Minus", action: MenuAction::ZoomOut },
            Shortcut { accelerator: "Ctrl+0", action: MenuAction::ActualSize },
            Shortcut { accelerator: "F10", action: MenuAction::ToggleFullScreen },
        ],
    }
}

/// Build the full menu bar for the current state.
pub fn build_menu(state: &MenuState, platform: HostPlatform) -> Vec<Menu> {
    let mut app_items = Vec::new();

    if state.auto_update_supported {
        if state.update_downloaded {
            app_items.push(MenuItem::new("Restart to Update", MenuAction::RestartToUpdate));
        } else {
            app_items.push(
                MenuItem::new("Check for Updates...", MenuAction::CheckForUpdates)
                    .enabled(!state.update_downloading),
            );
        }
        app_items.push(
            MenuItem::new("Automatically Check for Updates", MenuAction::ToggleAutoUpdate)
                .checked(state.auto_update_enabled),
        );
    }
    app_items.push(MenuItem::new("Configure runtime...", MenuAction::Configure));
    app_items.push(MenuItem::new("View logs...", MenuAction::ViewLogs));
    app_items.push(MenuItem::new("Quit pgAdmin 4", MenuAction::Quit));

    let view_items = shortcuts(platform)
        .iter()
        .map(|s| {
            let label = match s.action {
                MenuAction::ZoomIn => "Zoom In",
                MenuAction::ZoomOut => "Zoom Out",
                MenuAction::ActualSize => "Actual Size",
                _ => "Toggle Full Screen",
            };
            MenuItem::new(label, s.action).accelerator(s.accelerator)
        })
        .collect();

    vec![
        Menu {
            title: "pgAdmin 4",
            items: app_items,
        },
        Menu {
            title: "View",
            items: view_items,
        },
    ]
}

/// Native side of global hotkey registration.
pub trait HotKeyHost {
    fn register(&mut self, accelerator: &str) -> Result<(), String>;
    fn unregister(&mut self, accelerator: &str);
}

/// Tracks registered global shortcuts so a rebuild never double-registers.
#[derive(Debug)]
pub struct ShortcutRegistry<H> {
    host: H,
    registered: Vec<Shortcut>,
}

impl<H: HotKeyHost> ShortcutRegistry<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            registered: Vec::new(),
        }
    }

    /// Clear every previously registered shortcut, then register `shortcuts`.
    ///
    /// Shortcuts the host refuses are logged and left out.
    pub fn replace(&mut self, shortcuts: &[Shortcut]) {
        self.clear();
        for shortcut in shortcuts {
            match self.host.register(shortcut.accelerator) {
                Ok(()) => self.registered.push(*shortcut),
                Err(msg) => log::warn!(
                    "Failed to register {} shortcut with error: {msg}",
                    shortcut.accelerator
                ),
            }
        }
    }

    pub fn clear(&mut self) {
        for shortcut in self.registered.drain(..) {
            self.host.unregister(shortcut.accelerator);
        }
    }

    pub fn registered(&self) -> &[Shortcut] {
        &self.registered
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Default)]
    struct FakeHost {
        active: HashSet<String>,
        duplicates: usize,
    }

    impl HotKeyHost for FakeHost {
        fn register(&mut self, accelerator: &str) -> Result<(), String> {
            if !self.active.insert(accelerator.to_string()) {
                self.duplicates += 1;
            }
            Ok(())
        }

        fn unregister(&mut self, accelerator: &str) {
            self.active.remove(accelerator);
        }
    }

    fn app_menu(state: MenuState) -> Menu {
        build_menu(&state, HostPlatform::Linux).remove(0)
    }

    #[test]
    fn check_for_updates_disabled_while_downloading() {
        let menu = app_menu(MenuState {
            update_downloading: true,
            auto_update_supported: true,
            ..Default::default()
        });

        let item = &menu.items[0];
        assert_eq!(item.action, MenuAction::CheckForUpdates);
        assert!(!item.enabled);
    }

    #[test]
    fn restart_to_update_replaces_check_once_downloaded() {
        let menu = app_menu(MenuState {
            update_downloaded: true,
            auto_update_supported: true,
            ..Default::default()
        });

        assert_eq!(menu.items[0].action, MenuAction::RestartToUpdate);
        assert!(
            menu.items
                .iter()
                .all(|i| i.action != MenuAction::CheckForUpdates)
        );
    }

    #[test]
    fn update_items_hidden_without_capability() {
        let menu = app_menu(MenuState::default());

        assert!(menu.items.iter().all(|i| !matches!(
            i.action,
            MenuAction::CheckForUpdates | MenuAction::RestartToUpdate | MenuAction::ToggleAutoUpdate
        )));
    }

    #[test]
    fn repeated_rebuilds_never_duplicate_shortcuts() {
        let mut registry = ShortcutRegistry::new(FakeHost::default());

        for _ in 0..50 {
            registry.replace(&shortcuts(HostPlatform::MacOs));
        }

        assert_eq!(registry.host().duplicates, 0);
        assert_eq!(registry.host().active.len(), 4);
        assert_eq!(registry.registered().len(), 4);
    }

    #[test]
    fn platform_modifiers_differ() {
        assert_eq!(shortcuts(HostPlatform::MacOs)[0].accelerator, "Command+Equal");
        assert_eq!(shortcuts(HostPlatform::Windows)[3].accelerator, "F10");
    }
}
