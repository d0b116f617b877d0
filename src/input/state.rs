//! Active-input state machine
//!
//! Owns the active key and button sets and reconciles the two capture paths:
//! the window path delivers real press/release pairs, the system-wide path only
//! delivers pulses, so every pulse gets a synthesized release through a
//! per-key timer. Timers are plain deadlines in a map keyed by identifier; the
//! hub task sleeps until [`InputState::next_deadline`] and then calls
//! [`InputState::expire_due`].

use std::collections::HashMap;
use std::fmt::Debug;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::input::events::{CaptureMode, CursorPosition, InputEvent, InputSnapshot, KeyAction};
use crate::input::keys::{normalize, DisplayMode, InputClass, KeyCatalog, KeyId, MouseButton};

/// Ordered set of active identifiers.
///
/// Insertion order is kept for display priority, duplicates are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSet<T> {
    items: Vec<T>,
}

impl<T> Default for ActiveSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Copy + PartialEq + InputClass + Debug> ActiveSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item` at the end; returns false if it was already present
    pub fn insert(&mut self, item: T) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, item: T) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| *existing != item);
        self.items.len() != before
    }

    /// Removes every other member of `item`'s class and returns them
    pub fn evict_class_of(&mut self, item: T) -> Vec<T> {
        self.evict_where(|existing| {
            *existing != item && existing.is_directional() == item.is_directional()
        })
    }

    /// Keeps only the most recent member of each class and returns the rest
    pub fn retain_latest_per_class(&mut self) -> Vec<T> {
        let latest_directional = self.items.iter().rposition(|item| item.is_directional());
        let latest_other = self.items.iter().rposition(|item| !item.is_directional());
        let mut index = 0;
        self.evict_where(|_| {
            let keep = Some(index) == latest_directional || Some(index) == latest_other;
            index += 1;
            !keep
        })
    }

    pub fn evict_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut evicted = Vec::new();
        self.items.retain(|existing| {
            if predicate(existing) {
                evicted.push(*existing);
                false
            } else {
                true
            }
        });
        evicted
    }

    pub fn clear(&mut self) -> bool {
        let had_items = !self.items.is_empty();
        self.items.clear();
        had_items
    }

    pub fn contains(&self, item: T) -> bool {
        self.items.contains(&item)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// Why a forced release is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    PulseExpiry,
    ToggleDebounce,
}

#[derive(Debug, Clone, Copy)]
struct ReleaseTimer {
    deadline: Instant,
    kind: ReleaseKind,
}

// State machine settings
#[derive(Clone, Debug)]
pub struct StateSettings {
    pub pulse_release: Duration,
    pub toggle_debounce: Duration,
    pub single_active: bool,
    pub display_mode: DisplayMode,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            pulse_release: Duration::from_millis(100),
            toggle_debounce: Duration::from_millis(100),
            single_active: false,
            display_mode: DisplayMode::Standard,
        }
    }
}

#[derive(Debug)]
pub struct InputState {
    keys: ActiveSet<KeyId>,
    buttons: ActiveSet<MouseButton>,
    cursor: CursorPosition,

    display_mode: DisplayMode,
    capture_mode: CaptureMode,
    single_active: bool,

    catalog: KeyCatalog,
    pulse_release: Duration,
    toggle_debounce: Duration,

    // One pending forced release per key; rescheduling replaces the entry
    timers: HashMap<KeyId, ReleaseTimer>,

    // Source of the last applied key event, reset when focus returns
    last_source: Option<CaptureMode>,
}

impl InputState {
    pub fn new(settings: StateSettings, catalog: KeyCatalog) -> Self {
        debug!("Creating input state with settings: {:?}", settings);
        Self {
            keys: ActiveSet::new(),
            buttons: ActiveSet::new(),
            cursor: CursorPosition::default(),
            display_mode: settings.display_mode,
            capture_mode: CaptureMode::WindowScoped,
            single_active: settings.single_active,
            catalog,
            pulse_release: settings.pulse_release,
            toggle_debounce: settings.toggle_debounce,
            timers: HashMap::new(),
            last_source: None,
        }
    }

    /// Applies one input event. Returns true when the published state changed.
    pub fn ingest(&mut self, event: InputEvent, now: Instant) -> bool {
        match event {
            InputEvent::Key {
                source,
                action,
                token,
                timestamp: _,
            } => self.ingest_key(source, action, &token, now),
            InputEvent::Button { button, pressed } => {
                if pressed {
                    self.press_button(button)
                } else {
                    self.buttons.remove(button)
                }
            }
            InputEvent::CursorMoved { x, y } => {
                let position = CursorPosition { x, y };
                if self.cursor == position {
                    return false;
                }
                self.cursor = position;
                true
            }
            InputEvent::Focus(true) => {
                debug!("Focus gained, resetting source attribution");
                self.last_source = None;
                false
            }
            InputEvent::Focus(false) => {
                let cleared = self.clear_all();
                if cleared {
                    info!("Focus lost, cleared all active inputs");
                }
                cleared
            }
        }
    }

    fn ingest_key(&mut self, source: CaptureMode, action: KeyAction, token: &str, now: Instant) -> bool {
        if source != self.capture_mode {
            debug!(
                "Ignoring {:?} of {:?} from {} while {} is authoritative",
                action, token, source, self.capture_mode
            );
            return false;
        }

        let Some(key) = normalize(token, self.display_mode, &self.catalog) else {
            return false;
        };

        if self.last_source != Some(source) {
            debug!("Key source is now {}", source);
            self.last_source = Some(source);
        }

        match action {
            KeyAction::Press => {
                let changed = self.press_key(key);
                if key.is_toggle() {
                    self.schedule_release(key, ReleaseKind::ToggleDebounce, now);
                }
                changed
            }
            KeyAction::Release => {
                if key.is_toggle() {
                    debug!("Release of toggle key {} left to the debounce", key);
                    return false;
                }
                self.release_key(key)
            }
            KeyAction::Pulse => {
                let changed = self.press_key(key);
                let kind = if key.is_toggle() {
                    ReleaseKind::ToggleDebounce
                } else {
                    ReleaseKind::PulseExpiry
                };
                self.schedule_release(key, kind, now);
                changed
            }
        }
    }

    fn press_key(&mut self, key: KeyId) -> bool {
        let mut changed = false;
        if self.single_active {
            for evicted in self.keys.evict_class_of(key) {
                debug!("Single-active mode: {} evicted by {}", evicted, key);
                self.timers.remove(&evicted);
                changed = true;
            }
        }
        if self.keys.insert(key) {
            debug!("Key active: {}", key);
            changed = true;
        }
        changed
    }

    fn release_key(&mut self, key: KeyId) -> bool {
        self.timers.remove(&key);
        let removed = self.keys.remove(key);
        if removed {
            debug!("Key released: {}", key);
        }
        removed
    }

    fn press_button(&mut self, button: MouseButton) -> bool {
        let mut changed = false;
        if self.single_active {
            changed |= !self.buttons.evict_class_of(button).is_empty();
        }
        changed |= self.buttons.insert(button);
        changed
    }

    fn schedule_release(&mut self, key: KeyId, kind: ReleaseKind, now: Instant) {
        let delay = match kind {
            ReleaseKind::PulseExpiry => self.pulse_release,
            ReleaseKind::ToggleDebounce => self.toggle_debounce,
        };
        let timer = ReleaseTimer {
            deadline: now + delay,
            kind,
        };
        if let Some(previous) = self.timers.insert(key, timer) {
            debug!(
                "Rescheduled {:?} for {}, deadline moved by {:?}",
                kind,
                key,
                timer.deadline.saturating_duration_since(previous.deadline)
            );
        }
    }

    /// Earliest pending forced release, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|timer| timer.deadline).min()
    }

    /// Fires every timer whose deadline has passed. Returns true when keys were released.
    pub fn expire_due(&mut self, now: Instant) -> bool {
        let due: Vec<(KeyId, ReleaseKind)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(key, timer)| (*key, timer.kind))
            .collect();

        let mut changed = false;
        for (key, kind) in due {
            self.timers.remove(&key);
            if self.keys.remove(key) {
                debug!("{:?} released {}", kind, key);
                changed = true;
            }
        }
        changed
    }

    /// Switches the display mode; directional keys are dropped when leaving keyboard mode
    pub fn set_display_mode(&mut self, mode: DisplayMode) -> bool {
        if self.display_mode == mode {
            return false;
        }
        info!("Display mode {} -> {}", self.display_mode, mode);
        self.display_mode = mode;

        if mode != DisplayMode::Keyboard {
            for evicted in self.keys.evict_where(|key| key.is_directional()) {
                debug!("Directional key {} invalid in {} mode", evicted, mode);
                self.timers.remove(&evicted);
            }
        }
        true
    }

    /// Switches the authoritative capture path and drops all cross-mode state
    pub fn set_capture_mode(&mut self, mode: CaptureMode) -> bool {
        if self.capture_mode == mode {
            return false;
        }
        info!("Capture mode {} -> {}", self.capture_mode, mode);
        self.capture_mode = mode;
        self.last_source = None;
        self.clear_all();
        true
    }

    /// Toggles single-active mode. Enabling it keeps the latest key and button
    /// of each class; returns true when that evicted anything.
    pub fn set_single_active(&mut self, enabled: bool) -> bool {
        if self.single_active == enabled {
            return false;
        }
        info!("Single-active mode: {}", enabled);
        self.single_active = enabled;
        if !enabled {
            return false;
        }

        let evicted = self.keys.retain_latest_per_class();
        for key in &evicted {
            debug!("Single-active mode: {} evicted", key);
            self.timers.remove(key);
        }
        let buttons = self.buttons.retain_latest_per_class();
        !evicted.is_empty() || !buttons.is_empty()
    }

    fn clear_all(&mut self) -> bool {
        self.timers.clear();
        let keys = self.keys.clear();
        let buttons = self.buttons.clear();
        keys || buttons
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            keys: self.keys.as_slice().to_vec(),
            buttons: self.buttons.as_slice().to_vec(),
            cursor: self.cursor,
            display_mode: self.display_mode,
            capture_mode: self.capture_mode,
        }
    }

    pub fn keys(&self) -> &ActiveSet<KeyId> {
        &self.keys
    }

    pub fn buttons(&self) -> &ActiveSet<MouseButton> {
        &self.buttons
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    #[cfg(test)]
    pub(crate) fn last_source(&self) -> Option<CaptureMode> {
        self.last_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    const MS: Duration = Duration::from_millis(1);

    fn keyboard_state() -> InputState {
        InputState::new(
            StateSettings {
                display_mode: DisplayMode::Keyboard,
                ..Default::default()
            },
            KeyCatalog::all(),
        )
    }

    fn system_wide_state() -> InputState {
        let mut state = keyboard_state();
        state.set_capture_mode(CaptureMode::SystemWide);
        state
    }

    fn pulse(state: &mut InputState, token: &str, at: Instant) -> bool {
        state.ingest(InputEvent::pulse(token, Local::now()), at)
    }

    fn window_key(state: &mut InputState, token: &str, pressed: bool, at: Instant) -> bool {
        state.ingest(InputEvent::window_key(token, pressed), at)
    }

    #[test]
    fn release_of_inactive_key_is_a_no_op() {
        let now = Instant::now();
        for key in KeyId::ALL {
            let mut state = keyboard_state();
            window_key(&mut state, "b", true, now);
            let before = state.snapshot();

            let changed = window_key(&mut state, key.as_str(), false, now);
            if *key == KeyId::KeyB {
                continue;
            }
            assert!(!changed, "release of {key} changed state");
            assert_eq!(state.snapshot(), before);
        }
    }

    #[test]
    fn press_and_release_pair_in_window_mode() {
        let now = Instant::now();
        let mut state = keyboard_state();

        assert!(window_key(&mut state, "a", true, now));
        assert!(!window_key(&mut state, "A", true, now));
        assert!(state.keys().contains(KeyId::KeyA));
        assert!(window_key(&mut state, "a", false, now));
        assert!(state.keys().is_empty());
    }

    #[test]
    fn pulse_expires_after_release_delay_for_every_key() {
        let t0 = Instant::now();
        for key in KeyId::ALL.iter().filter(|key| !key.is_toggle()) {
            let mut state = system_wide_state();
            assert!(pulse(&mut state, key.as_str(), t0));
            assert!(state.keys().contains(*key), "{key} not active after pulse");

            state.expire_due(t0 + 99 * MS);
            assert!(state.keys().contains(*key), "{key} expired early");

            assert!(state.expire_due(t0 + 100 * MS));
            assert!(!state.keys().contains(*key), "{key} still active");
            assert_eq!(state.next_deadline(), None);
        }
    }

    #[test]
    fn pulses_coalesce_into_continuous_activity() {
        let t0 = Instant::now();
        let mut state = system_wide_state();

        pulse(&mut state, "a", t0);
        assert!(!pulse(&mut state, "a", t0 + 50 * MS));
        assert_eq!(state.next_deadline(), Some(t0 + 150 * MS));

        for offset in (0..150).step_by(5) {
            assert!(!state.expire_due(t0 + offset * MS));
            assert!(state.keys().contains(KeyId::KeyA), "inactive at {offset}ms");
        }

        assert!(state.expire_due(t0 + 150 * MS));
        assert!(state.keys().is_empty());
    }

    #[test]
    fn toggle_key_uses_debounced_release() {
        let t0 = Instant::now();
        let mut state = keyboard_state();

        assert!(window_key(&mut state, "CapsLock", true, t0));
        assert!(!window_key(&mut state, "CapsLock", false, t0 + 10 * MS));
        assert!(state.keys().contains(KeyId::CapsLock));

        window_key(&mut state, "CapsLock", true, t0 + 60 * MS);
        assert!(!state.expire_due(t0 + 100 * MS));
        assert!(state.keys().contains(KeyId::CapsLock));
        assert!(state.expire_due(t0 + 160 * MS));
        assert!(state.keys().is_empty());
    }

    #[test]
    fn focus_loss_clears_everything_in_both_capture_modes() {
        let now = Instant::now();
        for mode in [CaptureMode::WindowScoped, CaptureMode::SystemWide] {
            let mut state = keyboard_state();
            state.set_capture_mode(mode);
            match mode {
                CaptureMode::WindowScoped => {
                    window_key(&mut state, "a", true, now);
                }
                CaptureMode::SystemWide => {
                    pulse(&mut state, "a", now);
                }
            }
            state.ingest(
                InputEvent::Button {
                    button: MouseButton::Left,
                    pressed: true,
                },
                now,
            );
            assert!(!state.keys().is_empty());
            assert!(!state.buttons().is_empty());

            assert!(state.ingest(InputEvent::Focus(false), now));
            assert!(state.keys().is_empty());
            assert!(state.buttons().is_empty());
            assert_eq!(state.next_deadline(), None);
        }
    }

    #[test]
    fn focus_gain_changes_nothing_but_attribution() {
        let now = Instant::now();
        let mut state = keyboard_state();
        window_key(&mut state, "a", true, now);
        assert_eq!(state.last_source(), Some(CaptureMode::WindowScoped));

        let before = state.snapshot();
        assert!(!state.ingest(InputEvent::Focus(true), now));
        assert_eq!(state.snapshot(), before);
        assert_eq!(state.last_source(), None);
    }

    #[test]
    fn stale_timer_cannot_release_a_repulsed_key() {
        let t0 = Instant::now();
        let mut state = system_wide_state();

        pulse(&mut state, "a", t0);
        state.ingest(InputEvent::Focus(false), t0 + 10 * MS);
        pulse(&mut state, "a", t0 + 60 * MS);

        assert!(!state.expire_due(t0 + 100 * MS));
        assert!(state.keys().contains(KeyId::KeyA));
        assert!(state.expire_due(t0 + 160 * MS));
    }

    #[test]
    fn single_active_eviction_is_same_class_only() {
        let now = Instant::now();
        let mut state = InputState::new(
            StateSettings {
                single_active: true,
                display_mode: DisplayMode::Keyboard,
                ..Default::default()
            },
            KeyCatalog::all(),
        );

        window_key(&mut state, "a", true, now);
        window_key(&mut state, "ArrowLeft", true, now);
        assert_eq!(state.keys().as_slice(), &[KeyId::KeyA, KeyId::LeftArrow]);

        window_key(&mut state, "ArrowUp", true, now);
        assert_eq!(state.keys().as_slice(), &[KeyId::KeyA, KeyId::UpArrow]);

        window_key(&mut state, "b", true, now);
        assert_eq!(state.keys().as_slice(), &[KeyId::UpArrow, KeyId::KeyB]);
    }

    #[test]
    fn enabling_single_active_keeps_latest_of_each_class() {
        let now = Instant::now();
        let mut state = system_wide_state();
        for token in ["a", "b", "ArrowLeft", "ArrowUp"] {
            pulse(&mut state, token, now);
        }
        state.ingest(
            InputEvent::Button {
                button: MouseButton::Left,
                pressed: true,
            },
            now,
        );
        state.ingest(
            InputEvent::Button {
                button: MouseButton::Right,
                pressed: true,
            },
            now,
        );

        assert!(state.set_single_active(true));
        assert_eq!(state.keys().as_slice(), &[KeyId::KeyB, KeyId::UpArrow]);
        assert_eq!(state.buttons().as_slice(), &[MouseButton::Right]);
        assert_eq!(state.timers.len(), 2);
        assert!(!state.timers.contains_key(&KeyId::KeyA));

        assert!(!state.set_single_active(true));
        assert!(!state.set_single_active(false));
        assert!(state.expire_due(now + 100 * MS));
        assert!(state.keys().is_empty());
    }

    #[test]
    fn single_active_applies_to_buttons() {
        let now = Instant::now();
        let mut state = InputState::new(
            StateSettings {
                single_active: true,
                ..Default::default()
            },
            KeyCatalog::all(),
        );
        for button in [MouseButton::Left, MouseButton::Right] {
            state.ingest(InputEvent::Button { button, pressed: true }, now);
        }
        assert_eq!(state.buttons().as_slice(), &[MouseButton::Right]);
    }

    #[test]
    fn insertion_order_is_preserved_without_single_active() {
        let now = Instant::now();
        let mut state = keyboard_state();
        for token in ["c", "ArrowDown", "a", "c"] {
            window_key(&mut state, token, true, now);
        }
        assert_eq!(
            state.keys().as_slice(),
            &[KeyId::KeyC, KeyId::DownArrow, KeyId::KeyA]
        );
    }

    #[test]
    fn leaving_keyboard_mode_evicts_directional_keys() {
        let now = Instant::now();
        let mut state = keyboard_state();
        window_key(&mut state, "ArrowLeft", true, now);
        window_key(&mut state, "a", true, now);

        assert!(state.set_display_mode(DisplayMode::Standard));
        assert_eq!(state.keys().as_slice(), &[KeyId::KeyA]);
        assert!(!window_key(&mut state, "ArrowLeft", true, now));
    }

    #[test]
    fn inactive_source_is_ignored() {
        let now = Instant::now();
        let mut state = keyboard_state();
        assert!(!pulse(&mut state, "a", now));
        assert!(state.keys().is_empty());

        state.set_capture_mode(CaptureMode::SystemWide);
        assert!(!window_key(&mut state, "a", true, now));
        assert!(state.keys().is_empty());

        // Buttons still come from the window
        assert!(state.ingest(
            InputEvent::Button {
                button: MouseButton::Right,
                pressed: true
            },
            now
        ));
    }

    #[test]
    fn capture_mode_switch_clears_state() {
        let now = Instant::now();
        let mut state = keyboard_state();
        window_key(&mut state, "a", true, now);
        state.ingest(
            InputEvent::Button {
                button: MouseButton::Left,
                pressed: true,
            },
            now,
        );

        assert!(state.set_capture_mode(CaptureMode::SystemWide));
        assert!(state.keys().is_empty());
        assert!(state.buttons().is_empty());
        assert!(!state.set_capture_mode(CaptureMode::SystemWide));
    }

    #[test]
    fn cursor_moves_do_not_touch_sets() {
        let now = Instant::now();
        let mut state = keyboard_state();
        assert!(state.ingest(InputEvent::CursorMoved { x: 4.0, y: 2.0 }, now));
        assert!(!state.ingest(InputEvent::CursorMoved { x: 4.0, y: 2.0 }, now));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.cursor, CursorPosition { x: 4.0, y: 2.0 });
        assert!(snapshot.keys.is_empty());
        assert!(snapshot.buttons.is_empty());
    }

    #[test]
    fn unsupported_tokens_are_dropped() {
        let now = Instant::now();
        let mut state = keyboard_state();
        assert!(!window_key(&mut state, "Unidentified", true, now));
        assert!(!window_key(&mut state, "", true, now));
        assert!(state.keys().is_empty());
    }
}
