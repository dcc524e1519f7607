use image::GrayImage;

use crate::geometry::BoundingBox;

/// Tuning knobs handed to an [`ObjectClassifier`] on every call.
///
/// The vocabulary follows sliding-window cascade detectors: a larger
/// `scale_factor` means fewer pyramid levels (coarser, less sensitive),
/// a larger `min_neighbors` means fewer false positives and more misses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub scale_factor: f64,
    pub min_neighbors: u32,
    /// Smallest object (width, height) in pixels worth reporting.
    pub min_size: (u32, u32),
}

/// Minimum face size the face detector is asked for.
pub const MIN_FACE_SIZE: (u32, u32) = (30, 30);

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: (0, 0),
        }
    }
}

impl DetectionParams {
    /// Map a detection confidence in [0, 1] onto classifier parameters.
    ///
    /// Higher confidence is stricter: the scale factor shrinks towards 1.1
    /// and the neighbour requirement grows to 5.
    pub fn from_confidence(confidence: f64) -> Self {
        Self {
            scale_factor: 1.1 + (1.0 - confidence) * 0.2,
            min_neighbors: (5.0 * confidence).floor() as u32,
            min_size: MIN_FACE_SIZE,
        }
    }
}

/// Pluggable object detection backend (faces, eyes).
///
/// Implementations receive a single-channel intensity image and return
/// the bounding boxes of every detected object, in image coordinates.
/// Failures inside the backend are reported as "nothing found".
pub trait ObjectClassifier: Send + Sync {
    fn detect(&self, image: &GrayImage, params: &DetectionParams) -> Vec<BoundingBox>;
}
