//! Keyboard policy enforcement over browser key events.
//!
//! The tracker mirrors the candidate's keyboard: a keydown adds the key to
//! the held set, a keyup removes it. On every keydown it checks the key
//! against an allow-list and the held set against a list of forbidden
//! chords (copy/paste, tab switching, developer tools).
//!
//! Key labels follow `KeyboardEvent.key` semantics ("a", "Control", "F12").
//! Unknown labels are simply not on the allow-list.
//!
//! The unauthorized-key and forbidden-chord warnings share one cooldown, so
//! one firing masks the other for the rest of the window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cooldown::Cooldown;
use crate::error::ConfigError;
use crate::warning::Warning;

pub const DEFAULT_KEY_HISTORY_SIZE: usize = 20;
pub const DEFAULT_KEY_COOLDOWN: Duration = Duration::from_secs(2);

const NAVIGATION_KEYS: &[&str] = &[
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "Home",
    "End",
    "PageUp",
    "PageDown",
    "Backspace",
    "Delete",
];

const CONTROL_KEYS: &[&str] = &["Tab", "Enter", "Escape", " ", "Space", "Shift", "Control"];

const PUNCTUATION: &[&str] = &[
    ".", ",", ";", ":", "'", "\"", "!", "?", "-", "_", "(", ")", "[", "]", "{", "}", "/",
    "\\", "@", "#", "$", "%", "^", "&", "*", "+", "=", "<", ">", "`", "~", "|",
];

/// Chords reported when every member key is held at once, in check order.
pub const DEFAULT_FORBIDDEN_COMBINATIONS: &[&[&str]] = &[
    // copy / paste / cut / find
    &["Control", "c"],
    &["Control", "v"],
    &["Control", "x"],
    &["Control", "f"],
    // window and tab switching
    &["Alt", "Tab"],
    &["Control", "Tab"],
    // new tab / window
    &["Control", "t"],
    &["Control", "n"],
    // developer tools
    &["F12"],
    &["Control", "Shift", "i"],
    &["Control", "Shift", "j"],
];

/// The stock allow-list: navigation, editing and whitespace keys, digits,
/// ASCII letters in both cases, common punctuation, Shift and Control.
pub fn default_allowed_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = NAVIGATION_KEYS
        .iter()
        .chain(CONTROL_KEYS)
        .chain(PUNCTUATION)
        .map(|k| k.to_string())
        .collect();
    keys.extend(('0'..='9').map(String::from));
    keys.extend(('a'..='z').map(String::from));
    keys.extend(('A'..='Z').map(String::from));
    keys
}

pub fn default_forbidden_combinations() -> Vec<Vec<String>> {
    DEFAULT_FORBIDDEN_COMBINATIONS
        .iter()
        .map(|combo| combo.iter().map(|k| k.to_string()).collect())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventType {
    Keydown,
    Keyup,
}

/// One browser key event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    #[serde(alias = "type")]
    pub event_type: KeyEventType,
    pub key: String,
    /// Client-side timestamp (milliseconds), recorded as-is.
    #[serde(default)]
    pub timestamp: f64,
}

impl KeyEvent {
    pub fn keydown(key: impl Into<String>) -> Self {
        Self {
            event_type: KeyEventType::Keydown,
            key: key.into(),
            timestamp: 0.0,
        }
    }

    pub fn keyup(key: impl Into<String>) -> Self {
        Self {
            event_type: KeyEventType::Keyup,
            key: key.into(),
            timestamp: 0.0,
        }
    }
}

/// A keydown as remembered in the tracker's history.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub key: String,
    pub timestamp: f64,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardConfig {
    pub history_size: usize,
    pub warning_cooldown: Duration,
    /// Drop held keys older than this before chord matching. `None` keeps
    /// a key held until its keyup arrives.
    pub stale_key_timeout: Option<Duration>,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_KEY_HISTORY_SIZE,
            warning_cooldown: DEFAULT_KEY_COOLDOWN,
            stale_key_timeout: None,
        }
    }
}

impl KeyboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size == 0 {
            return Err(ConfigError::ZeroHistory("key history_size"));
        }
        Ok(())
    }
}

/// Per-session keyboard policy tracker.
pub struct KeyboardPolicyTracker {
    config: KeyboardConfig,
    active: bool,
    /// Held keys and when their latest keydown arrived.
    active_keys: HashMap<String, Instant>,
    key_history: VecDeque<KeyRecord>,
    allowed_keys: HashSet<String>,
    forbidden_combinations: Vec<Vec<String>>,
    cooldown: Cooldown,
}

impl Default for KeyboardPolicyTracker {
    fn default() -> Self {
        Self::build(KeyboardConfig::default())
    }
}

impl KeyboardPolicyTracker {
    pub fn new(config: KeyboardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: KeyboardConfig) -> Self {
        Self {
            active: true,
            active_keys: HashMap::new(),
            key_history: VecDeque::with_capacity(config.history_size),
            allowed_keys: default_allowed_keys(),
            forbidden_combinations: default_forbidden_combinations(),
            cooldown: Cooldown::new(config.warning_cooldown),
            config,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Global switch: an inactive tracker ignores every event.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Replace the allow-list wholesale. An empty list flags every key.
    pub fn set_allowed_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = keys.into_iter().map(Into::into).collect();
    }

    pub fn allowed_keys(&self) -> &HashSet<String> {
        &self.allowed_keys
    }

    /// Replace the chord list wholesale. A chord with no keys would match
    /// every keydown, so such a list is rejected and the current one kept.
    pub fn set_forbidden_combinations(
        &mut self,
        combinations: Vec<Vec<String>>,
    ) -> Result<(), ConfigError> {
        if let Some(index) = combinations.iter().position(Vec::is_empty) {
            return Err(ConfigError::EmptyCombination(index));
        }
        self.forbidden_combinations = combinations;
        Ok(())
    }

    pub fn forbidden_combinations(&self) -> &[Vec<String>] {
        &self.forbidden_combinations
    }

    /// Currently held keys, sorted.
    pub fn active_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.active_keys.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Recent keydowns, oldest first.
    pub fn key_history(&self) -> &VecDeque<KeyRecord> {
        &self.key_history
    }

    /// Forget held keys, history and cooldown; policy lists are kept.
    pub fn reset(&mut self) {
        self.active_keys.clear();
        self.key_history.clear();
        self.cooldown.reset();
    }

    /// Apply one key event. Returns the warnings it raised, or `None` when
    /// it raised none or the tracker is inactive.
    pub fn track(&mut self, event: &KeyEvent) -> Option<Vec<String>> {
        self.track_at(event, Instant::now())
    }

    /// [`track`](Self::track) with an explicit clock reading.
    pub fn track_at(&mut self, event: &KeyEvent, now: Instant) -> Option<Vec<String>> {
        if !self.active {
            return None;
        }

        let warnings = match event.event_type {
            KeyEventType::Keydown => self.key_down(event, now),
            KeyEventType::Keyup => {
                self.active_keys.remove(&event.key);
                Vec::new()
            }
        };

        if warnings.is_empty() {
            None
        } else {
            Some(warnings.iter().map(ToString::to_string).collect())
        }
    }

    fn key_down(&mut self, event: &KeyEvent, now: Instant) -> Vec<Warning> {
        let key = &event.key;
        self.active_keys.insert(key.clone(), now);
        self.key_history.push_back(KeyRecord {
            key: key.clone(),
            timestamp: event.timestamp,
            received_at: now,
        });
        while self.key_history.len() > self.config.history_size {
            self.key_history.pop_front();
        }

        if let Some(timeout) = self.config.stale_key_timeout {
            self.active_keys.retain(|held, pressed_at| {
                let fresh = now.saturating_duration_since(*pressed_at) <= timeout;
                if !fresh {
                    tracing::debug!(key = %held, "dropping stale held key");
                }
                fresh
            });
        }

        let mut warnings = Vec::new();

        if !self.allowed_keys.contains(key) {
            if self.cooldown.try_fire(now) {
                tracing::debug!(key = %key, "unauthorized key");
                warnings.push(Warning::UnauthorizedKey(key.clone()));
            } else {
                tracing::trace!(key = %key, "unauthorized key warning suppressed by cooldown");
            }
        }

        for combo in &self.forbidden_combinations {
            let held = combo.iter().all(|k| self.active_keys.contains_key(k));
            if !held {
                continue;
            }
            if self.cooldown.try_fire(now) {
                tracing::debug!(combo = %combo.join("+"), "forbidden key combination");
                warnings.push(Warning::ForbiddenCombination(combo.clone()));
            } else {
                tracing::trace!(
                    combo = %combo.join("+"),
                    "forbidden combination warning suppressed by cooldown"
                );
            }
        }

        warnings
    }
}
