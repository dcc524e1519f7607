//! Proctoring detectors for remote interview sessions.
//!
//! Two independent, per-session state machines:
//!
//! - [`FaceMovementDetector`] consumes decoded webcam frames, counts faces,
//!   validates each face with an optional eye check and infers head tilt
//!   from the horizontal shift of face centres between consecutive frames.
//! - [`KeyboardPolicyTracker`] consumes browser key events, maintains the
//!   set of held keys and reports disallowed keys and forbidden chords.
//!
//! Both emit human-readable warning strings, rate-limited by a
//! [`Cooldown`]. Neither performs I/O or locking; callers serialize access
//! per session.

#[cfg(feature = "onnx")]
pub mod blazeface_backend;
pub mod classifier;
pub mod cooldown;
pub mod error;
pub mod face_monitor;
pub mod geometry;
pub mod keyboard;
#[cfg(feature = "rustface")]
pub mod rustface_backend;
pub mod warning;

#[cfg(feature = "onnx")]
pub use blazeface_backend::{BlazefaceEyeClassifier, DEFAULT_EYE_CONFIDENCE};
pub use classifier::{DetectionParams, ObjectClassifier};
pub use cooldown::Cooldown;
pub use error::{BackendError, ConfigError};
pub use face_monitor::{
    FaceMonitorConfig, FaceMovementDetector, FacePairing, FrameAnalysis, TiltDirection,
};
pub use geometry::{BoundingBox, FaceObservation};
pub use keyboard::{
    KeyEvent, KeyEventType, KeyRecord, KeyboardConfig, KeyboardPolicyTracker,
};
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceClassifier;
pub use warning::Warning;
