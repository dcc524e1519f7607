//! Session id → detector pair ownership.
//!
//! The registry exclusively owns every session's detectors; dropping an
//! entry drops them. It is driven from the engine thread only, so insert
//! and remove are never observed half-done.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use proctor_core::{
    ConfigError, FaceMonitorConfig, FaceMovementDetector, KeyboardConfig, KeyboardPolicyTracker,
    ObjectClassifier,
};
use serde::Serialize;

use crate::engine::EngineError;

/// Detector state for one candidate's interview.
pub struct Session {
    pub face: FaceMovementDetector,
    pub keyboard: KeyboardPolicyTracker,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub frames_in_history: usize,
    pub eye_validation: bool,
    pub held_keys: Vec<String>,
    pub keyboard_active: bool,
    pub allowed_keys: usize,
    /// Forbidden chords, each rendered as "Control+c".
    pub forbidden_combinations: Vec<String>,
    /// Seconds since the last keydown, if any.
    pub last_keydown_secs: Option<f64>,
}

/// Builds fresh sessions from shared classifiers and validated configs.
pub struct SessionFactory {
    face_config: FaceMonitorConfig,
    keyboard_config: KeyboardConfig,
    keyboard_enabled: bool,
    face_classifier: Arc<dyn ObjectClassifier>,
    eye_classifier: Option<Arc<dyn ObjectClassifier>>,
}

impl SessionFactory {
    /// Validates both configs up front so a bad setting fails at startup.
    pub fn new(
        face_config: FaceMonitorConfig,
        keyboard_config: KeyboardConfig,
        keyboard_enabled: bool,
        face_classifier: Arc<dyn ObjectClassifier>,
        eye_classifier: Option<Arc<dyn ObjectClassifier>>,
    ) -> Result<Self, ConfigError> {
        face_config.validate()?;
        keyboard_config.validate()?;
        Ok(Self {
            face_config,
            keyboard_config,
            keyboard_enabled,
            face_classifier,
            eye_classifier,
        })
    }

    pub fn new_session(&self) -> Result<Session, ConfigError> {
        let mut face =
            FaceMovementDetector::new(self.face_config.clone(), self.face_classifier.clone())?;
        if let Some(eyes) = &self.eye_classifier {
            face = face.with_eye_classifier(eyes.clone());
        }
        let mut keyboard = KeyboardPolicyTracker::new(self.keyboard_config.clone())?;
        keyboard.set_active(self.keyboard_enabled);

        Ok(Session {
            face,
            keyboard,
            started_at: Utc::now(),
        })
    }
}

pub struct SessionRegistry {
    factory: SessionFactory,
    sessions: HashMap<String, Session>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(factory: SessionFactory, max_sessions: usize) -> Self {
        Self {
            factory,
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    /// Start (or restart) a session with fresh detectors.
    ///
    /// Returns `true` if the id was new, `false` if an existing session was
    /// replaced.
    pub fn start(&mut self, id: &str) -> Result<bool, EngineError> {
        if !self.sessions.contains_key(id) && self.sessions.len() >= self.max_sessions {
            return Err(EngineError::TooManySessions(self.max_sessions));
        }
        let session = self.factory.new_session()?;
        let replaced = self.sessions.insert(id.to_string(), session).is_some();
        tracing::info!(session = id, replaced, active = self.sessions.len(), "session started");
        Ok(!replaced)
    }

    /// Fetch a session, creating it on first use.
    pub fn get_or_create(&mut self, id: &str) -> Result<&mut Session, EngineError> {
        let active = self.sessions.len();
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                if active >= self.max_sessions {
                    return Err(EngineError::TooManySessions(self.max_sessions));
                }
                let session = self.factory.new_session()?;
                tracing::info!(session = id, active = active + 1, "session created on first use");
                Ok(entry.insert(session))
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Fetch an existing session without creating one.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Drop a session and all of its tracking state.
    pub fn clear(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!(session = id, active = self.sessions.len(), "session cleared");
        } else {
            tracing::debug!(session = id, "clear requested for unknown session");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// One summary per session, ordered by id.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let now = Instant::now();
        let mut out: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|(id, s)| SessionSummary {
                id: id.clone(),
                started_at: s.started_at,
                frames_in_history: s.face.history().len(),
                eye_validation: s.face.eye_validation(),
                held_keys: s.keyboard.active_keys().iter().map(|k| k.to_string()).collect(),
                keyboard_active: s.keyboard.is_active(),
                allowed_keys: s.keyboard.allowed_keys().len(),
                forbidden_combinations: s
                    .keyboard
                    .forbidden_combinations()
                    .iter()
                    .map(|combo| combo.join("+"))
                    .collect(),
                last_keydown_secs: s
                    .keyboard
                    .key_history()
                    .back()
                    .map(|record| now.saturating_duration_since(record.received_at).as_secs_f64()),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
