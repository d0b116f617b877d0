//! Input subsystem: global input capture and active-input state
//!
//! Two capture paths feed one state machine:
//!
//! 1. [`listener`] - window events (press/release, buttons, cursor, focus)
//! 2. [`registrar`] - system-wide accelerators, pulse-only
//! 3. [`state`] - active key/button sets, expiry timers, mode rules
//! 4. [`input_handle`] - hub task, lifecycle and control API
//!
//! # Architecture
//!
//! ```text
//! egui events ──► WindowListener ──┐
//!                                  ├──► InputHub (InputState) ──► watch<InputSnapshot>
//! ShortcutBackend ──► Registrar ───┘         (timers)
//! ```
//!
//! Exactly one capture path is authoritative for keys at a time. Switching
//! paths clears all active inputs.

pub mod events;
#[cfg(feature = "global-hook")]
pub mod hook;
pub mod input_handle;
pub mod keys;
pub mod listener;
pub mod registrar;
pub mod state;

pub use events::{CaptureMode, CursorPosition, InputEvent, InputSnapshot};
pub use input_handle::{InputControl, InputError, InputHandle, InputSettings};
pub use keys::{normalize, normalize_mouse_button, DisplayMode, KeyCatalog, KeyId, MouseButton};
pub use listener::WindowListener;
pub use registrar::{LoopbackBackend, ShortcutBackend, SystemWideRegistrar};

/// Backend used for system-wide capture in this build.
///
/// Without the `global-hook` feature there is no OS hook, so activation is
/// refused and the window path stays authoritative.
pub fn default_backend() -> Box<dyn ShortcutBackend> {
    #[cfg(feature = "global-hook")]
    {
        Box::new(hook::HookBackend::new())
    }
    #[cfg(not(feature = "global-hook"))]
    {
        tracing::info!("Built without global-hook, system-wide capture unavailable");
        Box::new(LoopbackBackend::unavailable())
    }
}
