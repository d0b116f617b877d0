//! Context menu templates
//!
//! The menu is described as plain data ([`MenuItem`]) so any host can render
//! it: the overlay draws it with egui, a tray host could serialize it. Clicking
//! an item yields its [`MenuAction`]; actions that only touch the persisted
//! state are applied with [`MenuAction::apply`], the rest are handled by the
//! host.

use serde::{Deserialize, Serialize};

use crate::input::DisplayMode;
use crate::persistence::{AppConfig, OPACITY_PRESETS, SCALE_PRESETS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuItemKind {
    #[default]
    Normal,
    Separator,
    Submenu,
    Checkbox,
    Radio,
}

// Action tag with its data payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "data", rename_all = "snake_case")]
pub enum MenuAction {
    HideWindow,
    SetMode(DisplayMode),
    TogglePenetrable,
    ToggleMirror,
    ToggleSingleActive,
    ToggleGlobalListener,
    SetScale(u32),
    SetOpacity(u32),
    Quit,
}

impl MenuAction {
    /// Applies actions that only change the persisted state.
    ///
    /// Returns true when `config` changed. Window and capture actions are left
    /// to the host and return false.
    pub fn apply(&self, config: &mut AppConfig) -> bool {
        let before = config.clone();
        match *self {
            MenuAction::SetMode(mode) => config.display_mode = mode,
            MenuAction::TogglePenetrable => config.penetrable = !config.penetrable,
            MenuAction::ToggleMirror => config.mirror_mode = !config.mirror_mode,
            MenuAction::ToggleSingleActive => config.single_active = !config.single_active,
            MenuAction::SetScale(scale) => config.scale = scale,
            MenuAction::SetOpacity(opacity) => config.opacity = opacity,
            MenuAction::HideWindow
            | MenuAction::ToggleGlobalListener
            | MenuAction::Quit => return false,
        }
        *config != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: MenuItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<MenuAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submenu: Vec<MenuItem>,
}

fn enabled_by_default() -> bool {
    true
}

impl MenuItem {
    fn new(label: impl Into<String>, kind: MenuItemKind) -> Self {
        Self {
            label: label.into(),
            kind,
            accelerator: None,
            checked: None,
            enabled: true,
            action: None,
            submenu: Vec::new(),
        }
    }

    pub fn normal(label: impl Into<String>, action: MenuAction) -> Self {
        Self {
            action: Some(action),
            ..Self::new(label, MenuItemKind::Normal)
        }
    }

    pub fn separator() -> Self {
        Self::new("", MenuItemKind::Separator)
    }

    pub fn submenu(label: impl Into<String>, items: Vec<MenuItem>) -> Self {
        Self {
            submenu: items,
            ..Self::new(label, MenuItemKind::Submenu)
        }
    }

    pub fn checkbox(label: impl Into<String>, checked: bool, action: MenuAction) -> Self {
        Self {
            checked: Some(checked),
            action: Some(action),
            ..Self::new(label, MenuItemKind::Checkbox)
        }
    }

    pub fn radio(label: impl Into<String>, checked: bool, action: MenuAction) -> Self {
        Self {
            checked: Some(checked),
            action: Some(action),
            ..Self::new(label, MenuItemKind::Radio)
        }
    }

    pub fn with_accelerator(mut self, accelerator: impl Into<String>) -> Self {
        self.accelerator = Some(accelerator.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_checked(&self) -> bool {
        self.checked.unwrap_or(false)
    }
}

fn platform_accelerator(key: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("Cmd+{key}")
    } else {
        format!("Ctrl+{key}")
    }
}

// Presets plus the current value when it is not one of them
fn preset_items(
    presets: &[u32],
    current: u32,
    label: impl Fn(u32) -> String,
    action: impl Fn(u32) -> MenuAction,
) -> Vec<MenuItem> {
    let mut items: Vec<MenuItem> = presets
        .iter()
        .map(|&value| MenuItem::radio(label(value), value == current, action(value)))
        .collect();

    if !presets.contains(&current) {
        items.insert(
            0,
            MenuItem::radio(format!("{current}%"), true, action(current)).disabled(),
        );
    }
    items
}

pub fn scale_items(current: u32) -> Vec<MenuItem> {
    preset_items(
        &SCALE_PRESETS,
        current,
        |value| {
            if value == 100 {
                "Default".to_string()
            } else {
                format!("{value}%")
            }
        },
        MenuAction::SetScale,
    )
}

pub fn opacity_items(current: u32) -> Vec<MenuItem> {
    preset_items(
        &OPACITY_PRESETS,
        current,
        |value| format!("{value}%"),
        MenuAction::SetOpacity,
    )
}

pub fn mode_items(current: DisplayMode) -> Vec<MenuItem> {
    DisplayMode::ALL
        .iter()
        .map(|&mode| {
            let label = match mode {
                DisplayMode::Standard => "Standard Mode",
                DisplayMode::Keyboard => "Keyboard Mode",
            };
            MenuItem::radio(label, mode == current, MenuAction::SetMode(mode))
        })
        .collect()
}

/// The context menu shared by the window and the tray
///
/// Only entries reachable from a visible window are listed; a minimized cat is
/// restored through the window manager. Window penetration carries a keyboard
/// accelerator since the menu cannot be opened while it is on.
pub fn shared_menu(config: &AppConfig, global_active: bool) -> Vec<MenuItem> {
    vec![
        MenuItem::normal("Hide Cat", MenuAction::HideWindow),
        MenuItem::separator(),
        MenuItem::submenu("Cat Mode", mode_items(config.display_mode)),
        MenuItem::checkbox("Window Penetration", config.penetrable, MenuAction::TogglePenetrable)
            .with_accelerator(platform_accelerator("Shift+P")),
        MenuItem::checkbox("Mirror Mode", config.mirror_mode, MenuAction::ToggleMirror),
        MenuItem::checkbox("Single Key Mode", config.single_active, MenuAction::ToggleSingleActive),
        MenuItem::checkbox("Global Listener", global_active, MenuAction::ToggleGlobalListener),
        MenuItem::submenu("Window Size", scale_items(config.scale)),
        MenuItem::submenu("Opacity", opacity_items(config.opacity)),
        MenuItem::separator(),
        MenuItem::normal("Quit", MenuAction::Quit).with_accelerator(platform_accelerator("Q")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[MenuItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    fn find<'a>(items: &'a [MenuItem], label: &str) -> &'a MenuItem {
        items.iter().find(|item| item.label == label).unwrap()
    }

    #[test]
    fn scale_presets_label_default() {
        let items = scale_items(100);
        assert_eq!(labels(&items), ["50%", "75%", "Default", "125%", "150%"]);
        assert!(find(&items, "Default").is_checked());
        assert_eq!(items.iter().filter(|item| item.is_checked()).count(), 1);
    }

    #[test]
    fn custom_value_is_prepended_checked_and_disabled() {
        let items = scale_items(110);
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].label, "110%");
        assert!(items[0].is_checked());
        assert!(!items[0].enabled);
        assert!(items[1..].iter().all(|item| !item.is_checked()));

        let items = opacity_items(60);
        assert_eq!(labels(&items), ["60%", "25%", "50%", "75%", "100%"]);
    }

    #[test]
    fn shared_menu_reflects_state() {
        let config = AppConfig {
            display_mode: DisplayMode::Keyboard,
            penetrable: true,
            ..AppConfig::default()
        };
        let menu = shared_menu(&config, true);

        assert!(find(&menu, "Window Penetration").is_checked());
        assert!(find(&menu, "Global Listener").is_checked());
        assert!(!find(&menu, "Mirror Mode").is_checked());

        let modes = &find(&menu, "Cat Mode").submenu;
        assert!(find(modes, "Keyboard Mode").is_checked());
        assert!(!find(modes, "Standard Mode").is_checked());
        assert_eq!(
            menu.iter().filter(|item| item.kind == MenuItemKind::Separator).count(),
            2
        );
    }

    #[test]
    fn every_entry_is_reachable_from_a_visible_window() {
        let menu = shared_menu(&AppConfig::default(), false);
        assert!(!labels(&menu).contains(&"Show Cat"));
        assert_eq!(labels(&menu)[0], "Hide Cat");

        let penetration = find(&menu, "Window Penetration");
        assert_eq!(
            penetration.accelerator.as_deref(),
            Some(platform_accelerator("Shift+P").as_str())
        );
    }

    #[test]
    fn actions_update_config() {
        let mut config = AppConfig::default();

        assert!(MenuAction::SetScale(125).apply(&mut config));
        assert_eq!(config.scale, 125);
        assert!(!MenuAction::SetScale(125).apply(&mut config));

        assert!(MenuAction::TogglePenetrable.apply(&mut config));
        assert!(config.penetrable);

        assert!(MenuAction::SetMode(DisplayMode::Keyboard).apply(&mut config));
        assert_eq!(config.display_mode, DisplayMode::Keyboard);

        assert!(!MenuAction::ToggleGlobalListener.apply(&mut config));
        assert!(!MenuAction::Quit.apply(&mut config));
    }

    #[test]
    fn items_serialize_with_type_and_action_tag() {
        let item = MenuItem::radio("75%", false, MenuAction::SetScale(75));
        let text = toml::to_string(&item).unwrap();
        assert!(text.contains("type = \"radio\""), "{text}");
        assert!(text.contains("tag = \"set_scale\""), "{text}");
        assert!(text.contains("data = 75"), "{text}");
    }
}
