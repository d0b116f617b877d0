//! System-wide capture registrar
//!
//! Binds a fixed catalog of accelerators through a [`ShortcutBackend`] and turns
//! every firing into a [`PulseEvent`]. The platform mechanism only reports "this
//! accelerator fired"; there is never a matching release, which the state
//! machine compensates for with its expiry timers.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Raw token → accelerator pairs bound when system-wide mode activates.
///
/// 26 letters, 10 digits and space, followed by the named keys. The raw token is
/// what the pulse carries; the normalizer maps it onto a [`KeyId`](super::keys::KeyId).
pub const TRIGGER_CATALOG: &[(&str, &str)] = &[
    ("a", "A"), ("b", "B"), ("c", "C"), ("d", "D"), ("e", "E"), ("f", "F"),
    ("g", "G"), ("h", "H"), ("i", "I"), ("j", "J"), ("k", "K"), ("l", "L"),
    ("m", "M"), ("n", "N"), ("o", "O"), ("p", "P"), ("q", "Q"), ("r", "R"),
    ("s", "S"), ("t", "T"), ("u", "U"), ("v", "V"), ("w", "W"), ("x", "X"),
    ("y", "Y"), ("z", "Z"),
    ("0", "0"), ("1", "1"), ("2", "2"), ("3", "3"), ("4", "4"),
    ("5", "5"), ("6", "6"), ("7", "7"), ("8", "8"), ("9", "9"),
    (" ", "Space"),
    ("Enter", "Enter"),
    ("Backspace", "Backspace"),
    ("Tab", "Tab"),
    ("CapsLock", "CapsLock"),
    ("Escape", "Escape"),
    ("Delete", "Delete"),
    ("ArrowLeft", "Left"),
    ("ArrowRight", "Right"),
    ("ArrowUp", "Up"),
    ("ArrowDown", "Down"),
    ("`", "Backquote"),
    ("/", "Slash"),
];

// Capacity of the pulse broadcast channel
const PULSE_BUFFER: usize = 256;

// One-shot "accelerator fired" signal
#[derive(Debug, Clone, PartialEq)]
pub struct PulseEvent {
    pub identifier: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("Accelerator {0} is already claimed by another owner")]
    Conflict(String),

    #[error("Accelerator {0} is not supported by the backend")]
    Unsupported(String),

    #[error("Shortcut backend unavailable: {0}")]
    Unavailable(String),

    #[error("Shortcut backend error: {0}")]
    Backend(String),
}

/// Handed to the backend for each binding; the backend calls [`TriggerSink::fire`]
/// whenever the accelerator fires.
#[derive(Debug, Clone)]
pub struct TriggerSink {
    token: String,
    pulses: broadcast::Sender<PulseEvent>,
}

impl TriggerSink {
    pub fn fire(&self) {
        let event = PulseEvent {
            identifier: self.token.clone(),
            timestamp: Local::now(),
        };
        debug!(
            "Pulse {:?} at {}",
            event.identifier,
            event.timestamp.format("%H:%M:%S.%3f")
        );
        if self.pulses.send(event).is_err() {
            debug!("Pulse for {:?} dropped, no subscribers", self.token);
        }
    }
}

/// Platform mechanism that owns system-wide accelerators.
///
/// Accelerators are a process-wide exclusive resource: `register` fails with
/// [`RegistrarError::Conflict`] when another owner holds the accelerator.
pub trait ShortcutBackend: Send + 'static {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    fn register(&mut self, accelerator: &str, sink: TriggerSink) -> Result<(), RegistrarError>;

    fn unregister(&mut self, accelerator: &str) -> Result<(), RegistrarError>;
}

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Recovering poisoned lock");
            poisoned.into_inner()
        }
    }
}

#[derive(Debug)]
struct LoopbackInner {
    available: bool,
    bindings: HashMap<String, TriggerSink>,
    claimed: HashSet<String>,
}

/// In-process backend.
///
/// Accelerators fire only when [`LoopbackBackend::fire`] is called, which lets a
/// host inject triggers from its own sources. Clones share the same bindings.
#[derive(Debug, Clone)]
pub struct LoopbackBackend {
    inner: Arc<Mutex<LoopbackInner>>,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoopbackInner {
                available: true,
                bindings: HashMap::new(),
                claimed: HashSet::new(),
            })),
        }
    }

    /// A backend that refuses activation, for builds without an OS hook
    pub fn unavailable() -> Self {
        let backend = Self::new();
        lock_or_recover(&backend.inner).available = false;
        backend
    }

    /// Marks `accelerator` as owned by someone else
    pub fn claim(&self, accelerator: &str) {
        lock_or_recover(&self.inner)
            .claimed
            .insert(accelerator.to_string());
    }

    /// Fires `accelerator`; returns false when it is not bound
    pub fn fire(&self, accelerator: &str) -> bool {
        let sink = lock_or_recover(&self.inner).bindings.get(accelerator).cloned();
        match sink {
            Some(sink) => {
                sink.fire();
                true
            }
            None => {
                debug!("Loopback accelerator {} not bound", accelerator);
                false
            }
        }
    }

    pub fn bound_accelerators(&self) -> Vec<String> {
        let mut bound: Vec<String> = lock_or_recover(&self.inner)
            .bindings
            .keys()
            .cloned()
            .collect();
        bound.sort();
        bound
    }
}

impl ShortcutBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn is_available(&self) -> bool {
        lock_or_recover(&self.inner).available
    }

    fn register(&mut self, accelerator: &str, sink: TriggerSink) -> Result<(), RegistrarError> {
        let mut inner = lock_or_recover(&self.inner);
        if !inner.available {
            return Err(RegistrarError::Unavailable("loopback disabled".to_string()));
        }
        if inner.claimed.contains(accelerator) {
            return Err(RegistrarError::Conflict(accelerator.to_string()));
        }
        inner.bindings.insert(accelerator.to_string(), sink);
        Ok(())
    }

    fn unregister(&mut self, accelerator: &str) -> Result<(), RegistrarError> {
        lock_or_recover(&self.inner).bindings.remove(accelerator);
        Ok(())
    }
}

pub struct SystemWideRegistrar {
    backend: Box<dyn ShortcutBackend>,
    pulses: broadcast::Sender<PulseEvent>,
    bound: Vec<String>,
    active: bool,
}

impl SystemWideRegistrar {
    pub fn new(backend: Box<dyn ShortcutBackend>) -> Self {
        info!("Creating system-wide registrar with backend: {}", backend.name());
        let (pulses, _) = broadcast::channel(PULSE_BUFFER);
        Self {
            backend,
            pulses,
            bound: Vec::new(),
            active: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PulseEvent> {
        self.pulses.subscribe()
    }

    /// Binds the whole trigger catalog.
    ///
    /// Individual binding failures are logged and skipped; the registrar counts
    /// as active afterwards even if nothing could be bound. Returns false only
    /// when the backend is unavailable.
    pub fn activate(&mut self) -> bool {
        if self.active {
            debug!("System-wide capture already active");
            return true;
        }
        if !self.backend.is_available() {
            warn!(
                "Shortcut backend {} unavailable, staying window-scoped",
                self.backend.name()
            );
            return false;
        }

        info!(
            "Activating system-wide capture for {} triggers",
            TRIGGER_CATALOG.len()
        );
        for (token, accelerator) in TRIGGER_CATALOG {
            let sink = TriggerSink {
                token: token.to_string(),
                pulses: self.pulses.clone(),
            };
            match self.backend.register(accelerator, sink) {
                Ok(()) => {
                    debug!("Bound accelerator {} for {:?}", accelerator, token);
                    self.bound.push(accelerator.to_string());
                }
                Err(e) => warn!("Skipping accelerator {}: {}", accelerator, e),
            }
        }

        self.active = true;
        info!(
            "System-wide capture active, {}/{} triggers bound",
            self.bound.len(),
            TRIGGER_CATALOG.len()
        );
        true
    }

    pub fn deactivate(&mut self) {
        if !self.active {
            debug!("System-wide capture already inactive");
            return;
        }

        for accelerator in self.bound.drain(..) {
            if let Err(e) = self.backend.unregister(&accelerator) {
                error!("Failed to unbind accelerator {}: {}", accelerator, e);
            }
        }
        self.active = false;
        info!("System-wide capture deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub(crate) fn bound_count(&self) -> usize {
        self.bound.len()
    }
}

impl Drop for SystemWideRegistrar {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keys::{normalize, DisplayMode, KeyCatalog};

    #[test]
    fn catalog_has_thirty_seven_alphanumerics_and_named_keys() {
        let alphanumeric = TRIGGER_CATALOG
            .iter()
            .filter(|(token, _)| token.len() == 1 && !"`/".contains(*token))
            .count();
        assert_eq!(alphanumeric, 37);
        assert_eq!(TRIGGER_CATALOG.len(), 49);
    }

    #[test]
    fn every_trigger_token_normalizes() {
        for (token, _) in TRIGGER_CATALOG {
            assert!(
                normalize(token, DisplayMode::Keyboard, &KeyCatalog::all()).is_some(),
                "{token:?} has no canonical key"
            );
        }
    }

    #[test]
    fn activation_binds_catalog_and_emits_pulses() {
        let backend = LoopbackBackend::new();
        let mut registrar = SystemWideRegistrar::new(Box::new(backend.clone()));
        let mut pulses = registrar.subscribe();

        assert!(registrar.activate());
        assert!(registrar.is_active());
        assert_eq!(registrar.bound_count(), TRIGGER_CATALOG.len());

        assert!(backend.fire("A"));
        let pulse = pulses.try_recv().unwrap();
        assert_eq!(pulse.identifier, "a");
        assert!(pulses.try_recv().is_err());
    }

    #[test]
    fn conflicts_are_skipped_without_aborting() {
        let backend = LoopbackBackend::new();
        backend.claim("B");
        backend.claim("Space");
        let mut registrar = SystemWideRegistrar::new(Box::new(backend.clone()));

        assert!(registrar.activate());
        assert!(registrar.is_active());
        assert_eq!(registrar.bound_count(), TRIGGER_CATALOG.len() - 2);
        assert!(!backend.fire("B"));
        assert!(backend.fire("C"));
    }

    #[test]
    fn unavailable_backend_refuses_activation() {
        let mut registrar = SystemWideRegistrar::new(Box::new(LoopbackBackend::unavailable()));
        assert!(!registrar.activate());
        assert!(!registrar.is_active());
    }

    #[test]
    fn lifecycle_is_idempotent() {
        let backend = LoopbackBackend::new();
        let mut registrar = SystemWideRegistrar::new(Box::new(backend.clone()));

        registrar.deactivate();
        assert!(!registrar.is_active());

        assert!(registrar.activate());
        assert!(registrar.activate());
        assert_eq!(backend.bound_accelerators().len(), TRIGGER_CATALOG.len());

        registrar.deactivate();
        registrar.deactivate();
        assert!(!registrar.is_active());
        assert!(backend.bound_accelerators().is_empty());
        assert!(!backend.fire("A"));
    }

    #[test]
    fn dropping_the_registrar_unbinds() {
        let backend = LoopbackBackend::new();
        {
            let mut registrar = SystemWideRegistrar::new(Box::new(backend.clone()));
            registrar.activate();
        }
        assert!(backend.bound_accelerators().is_empty());
    }
}
