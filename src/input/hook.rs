//! OS keyboard hook backend.
//!
//! A single `rdev::listen` thread observes every key press on the desktop and
//! fires the sink bound to the matching accelerator. The hook is observe-only:
//! keys still reach the focused application, and releases are never reported.

use rdev::{listen, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::input::registrar::{lock_or_recover, RegistrarError, ShortcutBackend, TriggerSink};

fn accelerator_to_key(accelerator: &str) -> Option<Key> {
    let key = match accelerator {
        "A" => Key::KeyA, "B" => Key::KeyB, "C" => Key::KeyC, "D" => Key::KeyD,
        "E" => Key::KeyE, "F" => Key::KeyF, "G" => Key::KeyG, "H" => Key::KeyH,
        "I" => Key::KeyI, "J" => Key::KeyJ, "K" => Key::KeyK, "L" => Key::KeyL,
        "M" => Key::KeyM, "N" => Key::KeyN, "O" => Key::KeyO, "P" => Key::KeyP,
        "Q" => Key::KeyQ, "R" => Key::KeyR, "S" => Key::KeyS, "T" => Key::KeyT,
        "U" => Key::KeyU, "V" => Key::KeyV, "W" => Key::KeyW, "X" => Key::KeyX,
        "Y" => Key::KeyY, "Z" => Key::KeyZ,
        "0" => Key::Num0, "1" => Key::Num1, "2" => Key::Num2, "3" => Key::Num3,
        "4" => Key::Num4, "5" => Key::Num5, "6" => Key::Num6, "7" => Key::Num7,
        "8" => Key::Num8, "9" => Key::Num9,
        "Space" => Key::Space,
        "Enter" => Key::Return,
        "Backspace" => Key::Backspace,
        "Tab" => Key::Tab,
        "CapsLock" => Key::CapsLock,
        "Escape" => Key::Escape,
        "Delete" => Key::Delete,
        "Left" => Key::LeftArrow,
        "Right" => Key::RightArrow,
        "Up" => Key::UpArrow,
        "Down" => Key::DownArrow,
        "Backquote" => Key::BackQuote,
        "Slash" => Key::Slash,
        _ => return None,
    };
    Some(key)
}

type Bindings = Arc<Mutex<Vec<(Key, TriggerSink)>>>;

pub struct HookBackend {
    bindings: Bindings,
    started: bool,
    failed: Arc<AtomicBool>,
}

impl Default for HookBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend {
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(Mutex::new(Vec::new())),
            started: false,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    // The listen thread is started once and never stops; unbinding only drops the sink.
    fn ensure_listening(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        let bindings = Arc::clone(&self.bindings);
        let failed = Arc::clone(&self.failed);
        std::thread::spawn(move || {
            info!("Keyboard hook thread started");
            let callback = move |event: rdev::Event| {
                if let EventType::KeyPress(key) = event.event_type {
                    let sink = lock_or_recover(&bindings)
                        .iter()
                        .find(|(bound, _)| *bound == key)
                        .map(|(_, sink)| sink.clone());
                    if let Some(sink) = sink {
                        sink.fire();
                    }
                }
            };
            if let Err(e) = listen(callback) {
                error!("Keyboard hook failed: {:?}", e);
                failed.store(true, Ordering::SeqCst);
            }
        });
    }
}

impl ShortcutBackend for HookBackend {
    fn name(&self) -> &str {
        "rdev-hook"
    }

    fn is_available(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    fn register(&mut self, accelerator: &str, sink: TriggerSink) -> Result<(), RegistrarError> {
        let key = accelerator_to_key(accelerator)
            .ok_or_else(|| RegistrarError::Unsupported(accelerator.to_string()))?;
        self.ensure_listening();
        if self.failed.load(Ordering::SeqCst) {
            return Err(RegistrarError::Unavailable("keyboard hook failed".to_string()));
        }
        let mut bindings = lock_or_recover(&self.bindings);
        bindings.retain(|(bound, _)| *bound != key);
        bindings.push((key, sink));
        Ok(())
    }

    fn unregister(&mut self, accelerator: &str) -> Result<(), RegistrarError> {
        let key = accelerator_to_key(accelerator)
            .ok_or_else(|| RegistrarError::Unsupported(accelerator.to_string()))?;
        lock_or_recover(&self.bindings).retain(|(bound, _)| *bound != key);
        Ok(())
    }
}
