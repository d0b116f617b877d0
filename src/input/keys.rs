//! Canonical key identifiers and the normalizer that maps raw key tokens onto them.
//!
//! Both capture paths deliver keys as loose strings: the window path uses the
//! names of the windowing toolkit (`"A"`, `"Enter"`, `"ArrowLeft"`), the
//! system-wide path uses the raw tokens of its trigger catalog (`"a"`, `" "`,
//! `"`"`). [`normalize`] folds all of them onto [`KeyId`], the fixed catalog the
//! rest of the subsystem works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

macro_rules! key_ids {
    ($($variant:ident),+ $(,)?) => {
        /// Canonical key identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum KeyId {
            $($variant),+
        }

        impl KeyId {
            /// Every identifier of the catalog, in declaration order
            pub const ALL: &'static [KeyId] = &[$(KeyId::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(KeyId::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

key_ids!(
    KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
    KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    Space, Return, Backspace, Tab, CapsLock, Escape, Delete, BackQuote, Slash,
    Control, Alt, Shift, Meta, Fn,
    LeftArrow, RightArrow, UpArrow, DownArrow,
);

impl KeyId {
    /// Arrow-class identifiers form the directional class
    pub fn is_directional(&self) -> bool {
        self.as_str().ends_with("Arrow")
    }

    /// Toggle keys only ever report a press, whatever the capture path
    pub fn is_toggle(&self) -> bool {
        matches!(self, KeyId::CapsLock)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyId::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or(())
    }
}

// Mouse buttons tracked by the button set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification used by the single-active rule: a set holds at most one
/// member per class when the rule is on.
pub trait InputClass {
    fn is_directional(&self) -> bool;
}

impl InputClass for KeyId {
    fn is_directional(&self) -> bool {
        KeyId::is_directional(self)
    }
}

impl InputClass for MouseButton {
    fn is_directional(&self) -> bool {
        false
    }
}

/// User-selected operating mode of the pet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Standard,
    Keyboard,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 2] = [DisplayMode::Standard, DisplayMode::Keyboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Standard => "standard",
            DisplayMode::Keyboard => "keyboard",
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of identifiers that have a visual asset and may therefore be shown.
///
/// The overlay ships one image per supported key (`keys/<KeyId>.png`). When no
/// asset directory is configured every catalog identifier is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCatalog {
    supported: BTreeSet<KeyId>,
}

impl Default for KeyCatalog {
    fn default() -> Self {
        Self::all()
    }
}

impl KeyCatalog {
    pub fn all() -> Self {
        Self {
            supported: KeyId::ALL.iter().copied().collect(),
        }
    }

    pub fn from_keys(keys: impl IntoIterator<Item = KeyId>) -> Self {
        Self {
            supported: keys.into_iter().collect(),
        }
    }

    /// Builds the catalog from the file stems of `*.png` assets in `dir`.
    ///
    /// Stems that are not catalog identifiers are skipped. An unreadable or
    /// empty directory falls back to the full catalog.
    pub async fn from_asset_dir(dir: &Path) -> Self {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Key asset directory {} unreadable ({}), supporting all keys",
                    dir.display(),
                    e
                );
                return Self::all();
            }
        };

        let mut supported = BTreeSet::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
                        continue;
                    }
                    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                        continue;
                    };
                    match stem.parse::<KeyId>() {
                        Ok(key) => {
                            debug!("Found key asset: {}", key);
                            supported.insert(key);
                        }
                        Err(()) => debug!("Ignoring asset without catalog key: {}", stem),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read key asset entry: {}", e);
                    break;
                }
            }
        }

        if supported.is_empty() {
            warn!(
                "No key assets found in {}, supporting all keys",
                dir.display()
            );
            return Self::all();
        }

        info!("Loaded {} supported keys from {}", supported.len(), dir.display());
        Self { supported }
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.supported.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.supported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }
}

// Case-insensitive alias table, many aliases per identifier
fn lookup_alias(lower: &str) -> Option<KeyId> {
    let key = match lower {
        " " | "space" | "spacebar" => KeyId::Space,
        "enter" | "return" | "numpadenter" => KeyId::Return,
        "backspace" => KeyId::Backspace,
        "tab" => KeyId::Tab,
        "capslock" | "caps" => KeyId::CapsLock,
        "escape" | "esc" => KeyId::Escape,
        "delete" | "del" => KeyId::Delete,
        "`" | "backquote" | "backtick" | "grave" => KeyId::BackQuote,
        "/" | "slash" => KeyId::Slash,
        "control" | "ctrl" => KeyId::Control,
        "alt" | "option" => KeyId::Alt,
        "shift" => KeyId::Shift,
        "meta" | "super" | "command" | "cmd" | "os" => KeyId::Meta,
        "fn" | "function" => KeyId::Fn,
        "arrowleft" | "leftarrow" | "left" => KeyId::LeftArrow,
        "arrowright" | "rightarrow" | "right" => KeyId::RightArrow,
        "arrowup" | "uparrow" | "up" => KeyId::UpArrow,
        "arrowdown" | "downarrow" | "down" => KeyId::DownArrow,
        _ => return lookup_character(lower).or_else(|| lookup_canonical(lower)),
    };
    Some(key)
}

// Single letters and digits
fn lookup_character(lower: &str) -> Option<KeyId> {
    let mut chars = lower.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    let name = match c {
        'a'..='z' => format!("Key{}", c.to_ascii_uppercase()),
        '0'..='9' => format!("Num{}", c),
        _ => return None,
    };
    name.parse().ok()
}

// Canonical names are aliases of themselves
fn lookup_canonical(lower: &str) -> Option<KeyId> {
    KeyId::ALL
        .iter()
        .copied()
        .find(|key| key.as_str().eq_ignore_ascii_case(lower))
}

// Structural rewrites for modifier families and function keys
fn rewrite_structural(lower: &str) -> Option<KeyId> {
    const MODIFIER_FAMILIES: [(&str, KeyId); 4] = [
        ("meta", KeyId::Meta),
        ("control", KeyId::Control),
        ("shift", KeyId::Shift),
        ("alt", KeyId::Alt),
    ];

    if let Some((_, family)) = MODIFIER_FAMILIES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
    {
        return Some(*family);
    }

    let is_function_key = lower
        .strip_prefix('f')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
    if is_function_key {
        return Some(KeyId::Fn);
    }

    None
}

/// Maps a raw key token onto its canonical identifier.
///
/// Returns `None` for tokens outside the catalog, for directional keys while
/// `mode` is not [`DisplayMode::Keyboard`], and for keys without an asset in
/// `catalog`. Never panics.
pub fn normalize(raw: &str, mode: DisplayMode, catalog: &KeyCatalog) -> Option<KeyId> {
    let lower = raw.to_lowercase();

    let Some(key) = lookup_alias(&lower).or_else(|| rewrite_structural(&lower)) else {
        debug!("Unknown key token dropped: {:?}", raw);
        return None;
    };

    if key.is_directional() && mode != DisplayMode::Keyboard {
        debug!("Directional key {} ignored in {} mode", key, mode);
        return None;
    }

    if !catalog.contains(key) {
        debug!("Key {} has no asset, dropped", key);
        return None;
    }

    Some(key)
}

/// Maps a window button code onto a tracked mouse button.
///
/// Accepts toolkit names (`"Primary"`, `"Secondary"`), plain names and the DOM
/// button numbers (`"0"` left, `"2"` right). Anything else is not tracked.
pub fn normalize_mouse_button(raw: &str) -> Option<MouseButton> {
    match raw.to_lowercase().as_str() {
        "primary" | "left" | "0" => Some(MouseButton::Left),
        "secondary" | "right" | "2" => Some(MouseButton::Right),
        _ => None,
    }
}
