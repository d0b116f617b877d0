//! # Persistence Module
//!
//! ## Why This Module Exists
//! The overlay remembers how the user left it: display mode, window scale and
//! opacity, the single-active flag, whether system-wide capture was on, and the
//! timer durations of the input hub. All of it lives in one TOML file under the
//! platform config directory. Window penetration is session-only: a window that
//! ignores the mouse cannot show its context menu, so it never survives a restart.
//!
//! ## Key Abstractions
//! - **AppConfig**: the complete persisted state, every field defaulted
//! - **ConfigStore**: reads and writes the file with `tokio::fs`
//! - **PersistenceManager**: background worker so the UI thread never waits on disk
//!
//! ## Error Handling Strategy
//! Saving returns `color_eyre::Result` with context on every step. Loading
//! never fails: a missing or corrupt file degrades to defaults with a warning,
//! so the pet always starts.

pub mod config_store;
pub mod persistence_worker;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::input::{DisplayMode, InputSettings};

pub use config_store::ConfigStore;
pub use persistence_worker::{ConfigAction, PersistenceManager};

/// Scale presets offered in the menu, in percent
pub const SCALE_PRESETS: [u32; 5] = [50, 75, 100, 125, 150];
/// Opacity presets offered in the menu, in percent
pub const OPACITY_PRESETS: [u32; 4] = [25, 50, 75, 100];

/// Complete persisted state of the overlay.
///
/// Missing keys in the file take their default, so older files keep loading.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub display_mode: DisplayMode,
    /// Window scale in percent
    pub scale: u32,
    /// Window opacity in percent
    pub opacity: u32,
    /// At most one directional and one non-directional key at a time
    pub single_active: bool,
    /// Let mouse input pass through the window; not persisted
    #[serde(skip)]
    pub penetrable: bool,
    pub mirror_mode: bool,
    /// Capture keys system-wide instead of only while focused
    pub global_listener: bool,
    /// Directory with one `<KeyId>.png` per supported key
    pub key_asset_dir: Option<PathBuf>,
    /// Root of `<mode>/cat.model3.json`
    pub model_root: PathBuf,
    pub pulse_release_ms: u64,
    pub toggle_debounce_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Standard,
            scale: 100,
            opacity: 100,
            single_active: false,
            penetrable: false,
            mirror_mode: false,
            global_listener: false,
            key_asset_dir: None,
            model_root: PathBuf::from("models"),
            pulse_release_ms: 100,
            toggle_debounce_ms: 100,
        }
    }
}

impl AppConfig {
    pub fn input_settings(&self) -> InputSettings {
        InputSettings {
            pulse_release_ms: self.pulse_release_ms,
            toggle_debounce_ms: self.toggle_debounce_ms,
            single_active: self.single_active,
            display_mode: self.display_mode,
            ..InputSettings::default()
        }
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale as f32 / 100.0
    }

    pub fn opacity_factor(&self) -> f32 {
        self.opacity.min(100) as f32 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_settings_follow_config() {
        let config = AppConfig {
            display_mode: DisplayMode::Keyboard,
            single_active: true,
            pulse_release_ms: 250,
            ..AppConfig::default()
        };
        let settings = config.input_settings();
        assert_eq!(settings.display_mode, DisplayMode::Keyboard);
        assert!(settings.single_active);
        assert_eq!(settings.pulse_release_ms, 250);
        assert_eq!(settings.toggle_debounce_ms, 100);
    }

    #[test]
    fn factors_are_fractions() {
        let config = AppConfig {
            scale: 125,
            opacity: 150,
            ..AppConfig::default()
        };
        assert_eq!(config.scale_factor(), 1.25);
        assert_eq!(config.opacity_factor(), 1.0);
    }

    #[test]
    fn penetration_is_not_persisted() {
        let config = AppConfig {
            penetrable: true,
            ..AppConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("penetrable"), "{text}");

        let loaded: AppConfig = toml::from_str("penetrable = true\nscale = 75\n").unwrap();
        assert!(!loaded.penetrable);
        assert_eq!(loaded.scale, 75);
    }
}
