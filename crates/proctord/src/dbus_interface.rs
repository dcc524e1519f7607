use std::sync::Arc;

use proctor_core::KeyEvent;
use zbus::interface;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "io.github.proctor.Proctor1";
pub const OBJECT_PATH: &str = "/io/github/proctor/Proctor1";

/// Shared state accessible by D-Bus method handlers.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub eye_validation: bool,
}

/// D-Bus interface consumed by the interview front end.
///
/// Bus name: io.github.proctor.Proctor1
/// Object path: /io/github/proctor/Proctor1
pub struct ProctorService {
    pub state: Arc<AppState>,
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "io.github.proctor.Proctor1")]
impl ProctorService {
    /// Start monitoring a session, resetting it if it already exists.
    ///
    /// Returns false when an existing session was reset.
    async fn start_session(&self, session_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(session = session_id, "start_session requested");
        self.state
            .engine
            .start_session(session_id)
            .await
            .map_err(|e| {
                tracing::error!(session = session_id, error = %e, "start_session failed");
                failed(e)
            })
    }

    /// Stop monitoring a session and discard its state.
    async fn clear_session(&self, session_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(session = session_id, "clear_session requested");
        self.state
            .engine
            .clear_session(session_id)
            .await
            .map_err(failed)
    }

    /// Analyse one encoded webcam frame. Empty bytes mean "no frame".
    ///
    /// Returns the frame analysis as JSON.
    async fn process_frame(&self, session_id: &str, frame: Vec<u8>) -> zbus::fdo::Result<String> {
        let analysis = self
            .state
            .engine
            .process_frame(session_id, frame)
            .await
            .map_err(|e| {
                tracing::error!(session = session_id, error = %e, "process_frame failed");
                failed(e)
            })?;
        serde_json::to_string(&analysis).map_err(failed)
    }

    /// Apply one browser key event given as JSON
    /// (`{"type": "keydown", "key": "c", "timestamp": 1712.5}`).
    ///
    /// Returns a JSON array of warnings, or `null` when there are none.
    async fn track_key(&self, session_id: &str, event_json: &str) -> zbus::fdo::Result<String> {
        let event: KeyEvent = serde_json::from_str(event_json).map_err(|e| {
            tracing::warn!(session = session_id, error = %e, "malformed key event");
            zbus::fdo::Error::InvalidArgs(format!("malformed key event: {e}"))
        })?;
        let warnings = self
            .state
            .engine
            .track_key(session_id, event)
            .await
            .map_err(|e| {
                tracing::error!(session = session_id, error = %e, "track_key failed");
                failed(e)
            })?;
        serde_json::to_string(&warnings).map_err(failed)
    }

    /// Replace the session's key allow-list.
    async fn set_allowed_keys(&self, session_id: &str, keys: Vec<String>) -> zbus::fdo::Result<()> {
        self.state
            .engine
            .set_allowed_keys(session_id, keys)
            .await
            .map_err(failed)
    }

    /// Replace the session's forbidden key chords.
    ///
    /// A chord with no keys is rejected and the current list kept.
    async fn set_forbidden_combinations(
        &self,
        session_id: &str,
        combinations: Vec<Vec<String>>,
    ) -> zbus::fdo::Result<()> {
        self.state
            .engine
            .set_forbidden_combinations(session_id, combinations)
            .await
            .map_err(|e| match e {
                EngineError::Config(e) => zbus::fdo::Error::InvalidArgs(e.to_string()),
                e => failed(e),
            })
    }

    /// Turn keyboard tracking on or off for one session.
    async fn set_keyboard_active(&self, session_id: &str, active: bool) -> zbus::fdo::Result<()> {
        self.state
            .engine
            .set_keyboard_active(session_id, active)
            .await
            .map_err(failed)
    }

    /// Forget held keys, key history and the keyboard cooldown, e.g. when
    /// the exam window loses focus and keyups will not arrive.
    ///
    /// Returns false when the session does not exist.
    async fn reset_keyboard(&self, session_id: &str) -> zbus::fdo::Result<bool> {
        self.state
            .engine
            .reset_keyboard(session_id)
            .await
            .map_err(failed)
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let sessions = self.state.engine.status().await.map_err(failed)?;
        let config = &self.state.config;

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "sessions_active": sessions.len(),
            "sessions": sessions,
            "tilt_threshold": config.tilt_threshold,
            "min_detection_confidence": config.min_detection_confidence,
            "keyboard_enabled": config.keyboard_enabled,
            "eye_validation": self.state.eye_validation,
        })
        .to_string())
    }
}
