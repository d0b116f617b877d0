use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::input::keys::{DisplayMode, KeyId, MouseButton};

// Which capture path is authoritative for keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaptureMode {
    #[default]
    WindowScoped,
    SystemWide,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::WindowScoped => write!(f, "WindowScoped"),
            CaptureMode::SystemWide => write!(f, "SystemWide"),
        }
    }
}

// Key event kinds; pulses never get a matching release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
    Pulse,
}

/// Tagged input event, the only thing the state machine ingests.
///
/// Key events carry the raw token of their capture path; normalization happens
/// on ingestion because it depends on the current display mode.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Key {
        source: CaptureMode,
        action: KeyAction,
        token: String,
        timestamp: DateTime<Local>,
    },
    Button {
        button: MouseButton,
        pressed: bool,
    },
    CursorMoved {
        x: f32,
        y: f32,
    },
    Focus(bool),
}

impl InputEvent {
    pub fn window_key(token: impl Into<String>, pressed: bool) -> Self {
        InputEvent::Key {
            source: CaptureMode::WindowScoped,
            action: if pressed {
                KeyAction::Press
            } else {
                KeyAction::Release
            },
            token: token.into(),
            timestamp: Local::now(),
        }
    }

    pub fn pulse(token: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        InputEvent::Key {
            source: CaptureMode::SystemWide,
            action: KeyAction::Pulse,
            token: token.into(),
            timestamp,
        }
    }
}

// Last known cursor position in window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

/// State published after every change of the active-input model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputSnapshot {
    pub keys: Vec<KeyId>,
    pub buttons: Vec<MouseButton>,
    pub cursor: CursorPosition,
    pub display_mode: DisplayMode,
    pub capture_mode: CaptureMode,
}

impl InputSnapshot {
    pub fn has_directional_key(&self) -> bool {
        self.keys.iter().any(|key| key.is_directional())
    }

    pub fn has_non_directional_key(&self) -> bool {
        self.keys.iter().any(|key| !key.is_directional())
    }

    pub fn is_key_active(&self, key: KeyId) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_button_active(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }
}
