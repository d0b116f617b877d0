use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::input::events::InputEvent;
use crate::input::input_handle::HubCommand;
use crate::input::keys::normalize_mouse_button;

/// Maps a window event onto an [`InputEvent`].
///
/// Key repeats are dropped since a held key is already active. Only the primary
/// and secondary pointer buttons are tracked.
pub fn translate(event: &egui::Event) -> Option<InputEvent> {
    match event {
        egui::Event::Key {
            key,
            pressed,
            repeat,
            ..
        } => {
            if *repeat {
                return None;
            }
            Some(InputEvent::window_key(key.name(), *pressed))
        }
        egui::Event::PointerButton {
            button, pressed, ..
        } => normalize_mouse_button(&format!("{:?}", button)).map(|button| InputEvent::Button {
            button,
            pressed: *pressed,
        }),
        egui::Event::PointerMoved(pos) => Some(InputEvent::CursorMoved { x: pos.x, y: pos.y }),
        egui::Event::WindowFocused(focused) => Some(InputEvent::Focus(*focused)),
        _ => None,
    }
}

/// Press/release events for every modifier that changed between two frames.
///
/// egui reports modifiers as frame state instead of key events. `mac_cmd` is
/// the only source for `Meta`, other platforms do not expose it. CapsLock is not
/// reported at all, so it is only captured by the system-wide hook.
pub fn modifier_edges(previous: egui::Modifiers, current: egui::Modifiers) -> Vec<InputEvent> {
    [
        ("Control", previous.ctrl, current.ctrl),
        ("Alt", previous.alt, current.alt),
        ("Shift", previous.shift, current.shift),
        ("Meta", previous.mac_cmd, current.mac_cmd),
    ]
    .into_iter()
    .filter(|(_, before, now)| before != now)
    .map(|(token, _, now)| InputEvent::window_key(token, now))
    .collect()
}

/// Forwards window events of the overlay to the input hub.
///
/// Runs on the UI thread, so sending never blocks; a full hub queue drops the
/// event with an error log.
#[derive(Clone, Debug)]
pub struct WindowListener {
    commands: mpsc::Sender<HubCommand>,
    modifiers: egui::Modifiers,
}

impl WindowListener {
    pub(crate) fn new(commands: mpsc::Sender<HubCommand>) -> Self {
        Self {
            commands,
            modifiers: egui::Modifiers::NONE,
        }
    }

    /// Translates and forwards `event`; returns true when something was sent
    pub fn handle_event(&mut self, event: &egui::Event) -> bool {
        if let egui::Event::WindowFocused(false) = event {
            // The hub clears everything on focus loss, held modifiers included
            self.modifiers = egui::Modifiers::NONE;
        }
        match translate(event) {
            Some(input) => self.forward(input),
            None => false,
        }
    }

    /// Forwards modifier changes since the last call; returns the number sent
    pub fn sync_modifiers(&mut self, modifiers: egui::Modifiers) -> usize {
        let edges = modifier_edges(self.modifiers, modifiers);
        self.modifiers = modifiers;
        edges
            .into_iter()
            .map(|edge| self.forward(edge))
            .filter(|sent| *sent)
            .count()
    }

    pub fn forward(&self, event: InputEvent) -> bool {
        debug!("Window event: {:?}", event);
        match self.commands.try_send(HubCommand::Input(event)) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to forward window event: {}", e);
                false
            }
        }
    }
}
