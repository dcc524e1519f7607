use std::fmt;

use crate::face_monitor::TiltDirection;

/// Every warning the detectors can raise.
///
/// The `Display` form is the message relayed to the candidate's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    NoFrame,
    NoFace,
    MultipleFaces(usize),
    NoEyesVisible,
    HeadTilt(TiltDirection),
    UnauthorizedKey(String),
    ForbiddenCombination(Vec<String>),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoFrame => f.write_str("No frame received"),
            Warning::NoFace => f.write_str("No face detected"),
            Warning::MultipleFaces(n) => write!(f, "Multiple faces detected ({n} faces)"),
            Warning::NoEyesVisible => f.write_str("Face detected but no eyes visible"),
            Warning::HeadTilt(direction) => write!(f, "Head tilt detected ({direction})"),
            Warning::UnauthorizedKey(key) => write!(f, "Unauthorized key pressed: {key}"),
            Warning::ForbiddenCombination(keys) => {
                write!(f, "Forbidden key combination detected: {}", keys.join("+"))
            }
        }
    }
}
