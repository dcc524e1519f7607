use std::path::PathBuf;
use std::time::Duration;

use proctor_core::{FaceMonitorConfig, FacePairing, KeyboardConfig, DEFAULT_EYE_CONFIDENCE};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Face detector confidence in [0, 1]; higher is stricter.
    pub min_detection_confidence: f64,
    /// Reserved general movement sensitivity (not used by tilt checks).
    pub movement_threshold: f64,
    /// Number of per-frame face snapshots kept per session.
    pub history_size: usize,
    /// Minimum normalized horizontal face shift reported as a head tilt.
    pub tilt_threshold: f64,
    /// Seconds between two head-tilt warnings.
    pub tilt_cooldown_secs: u64,
    /// How faces are paired between consecutive frames.
    pub face_pairing: FacePairing,
    /// Seconds between two keyboard warnings (shared by both kinds).
    pub key_cooldown_secs: u64,
    /// Number of keydowns kept per session.
    pub key_history_size: usize,
    /// Drop held keys older than this many seconds. Unset keeps them until keyup.
    pub stale_key_secs: Option<u64>,
    /// Whether new sessions track keyboard events at all.
    pub keyboard_enabled: bool,
    /// SeetaFace frontal face model.
    pub model_path: PathBuf,
    /// BlazeFace ONNX model used to check each face for eyes.
    pub eye_model_path: PathBuf,
    /// Anchor score the eye model must reach for eyes to count as visible.
    pub eye_confidence: f32,
    /// Upper bound on concurrently registered sessions.
    pub max_sessions: usize,
    /// Whether the daemon is running on the session bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `PROCTOR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("proctor");

        let model_path = std::env::var("PROCTOR_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("seeta_fd_frontal_v1.0.bin"));
        let eye_model_path = std::env::var("PROCTOR_EYE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("blazeface_short_range.onnx"));

        Self {
            min_detection_confidence: env_f64("PROCTOR_MIN_DETECTION_CONFIDENCE", 0.5),
            movement_threshold: env_f64("PROCTOR_MOVEMENT_THRESHOLD", 0.15),
            history_size: env_usize("PROCTOR_HISTORY_SIZE", 10),
            tilt_threshold: env_f64("PROCTOR_TILT_THRESHOLD", 0.06),
            tilt_cooldown_secs: env_u64("PROCTOR_TILT_COOLDOWN_SECS", 5),
            face_pairing: std::env::var("PROCTOR_FACE_PAIRING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            key_cooldown_secs: env_u64("PROCTOR_KEY_COOLDOWN_SECS", 2),
            key_history_size: env_usize("PROCTOR_KEY_HISTORY_SIZE", 20),
            stale_key_secs: std::env::var("PROCTOR_STALE_KEY_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            keyboard_enabled: std::env::var("PROCTOR_KEYBOARD_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            model_path,
            eye_model_path,
            eye_confidence: env_f64("PROCTOR_EYE_CONFIDENCE", DEFAULT_EYE_CONFIDENCE as f64) as f32,
            max_sessions: env_usize("PROCTOR_MAX_SESSIONS", 256),
            session_bus: std::env::var("PROCTOR_SESSION_BUS").is_ok(),
        }
    }

    pub fn face_config(&self) -> FaceMonitorConfig {
        FaceMonitorConfig {
            min_detection_confidence: self.min_detection_confidence,
            movement_threshold: self.movement_threshold,
            history_size: self.history_size,
            tilt_threshold: self.tilt_threshold,
            warning_cooldown: Duration::from_secs(self.tilt_cooldown_secs),
            pairing: self.face_pairing,
        }
    }

    pub fn keyboard_config(&self) -> KeyboardConfig {
        KeyboardConfig {
            history_size: self.key_history_size,
            warning_cooldown: Duration::from_secs(self.key_cooldown_secs),
            stale_key_timeout: self.stale_key_secs.map(Duration::from_secs),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        std::env::set_var("PROCTOR_TEST_GARBAGE_F64", "not-a-number");
        assert_eq!(env_f64("PROCTOR_TEST_GARBAGE_F64", 0.25), 0.25);
        assert_eq!(env_usize("PROCTOR_TEST_UNSET_USIZE", 7), 7);
        std::env::set_var("PROCTOR_TEST_SET_U64", "42");
        assert_eq!(env_u64("PROCTOR_TEST_SET_U64", 1), 42);
    }

    #[test]
    fn test_detector_configs_carry_values() {
        let config = Config {
            min_detection_confidence: 0.7,
            movement_threshold: 0.15,
            history_size: 4,
            tilt_threshold: 0.1,
            tilt_cooldown_secs: 9,
            face_pairing: FacePairing::NearestCentroid,
            key_cooldown_secs: 3,
            key_history_size: 8,
            stale_key_secs: Some(30),
            keyboard_enabled: true,
            model_path: PathBuf::from("/tmp/model.bin"),
            eye_model_path: PathBuf::from("/tmp/eyes.onnx"),
            eye_confidence: 0.5,
            max_sessions: 1,
            session_bus: true,
        };

        let face = config.face_config();
        assert_eq!(face.history_size, 4);
        assert_eq!(face.warning_cooldown, Duration::from_secs(9));
        assert_eq!(face.pairing, FacePairing::NearestCentroid);
        assert!(face.validate().is_ok());

        let keyboard = config.keyboard_config();
        assert_eq!(keyboard.history_size, 8);
        assert_eq!(keyboard.warning_cooldown, Duration::from_secs(3));
        assert_eq!(keyboard.stale_key_timeout, Some(Duration::from_secs(30)));
    }
}
