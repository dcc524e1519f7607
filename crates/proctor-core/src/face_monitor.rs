//! Head-movement monitoring over a stream of webcam frames.
//!
//! Each frame is reduced to a list of [`FaceObservation`]s. The detector
//! warns when the frame holds no face or more than one, when a detected
//! face region contains no eyes, and when a face centre jumps sideways by
//! more than `tilt_threshold` between consecutive frames.
//!
//! Faces are paired across frames by list position by default. That is a
//! simplification: if the classifier reorders faces, or the count changes,
//! unrelated faces get compared. [`FacePairing::NearestCentroid`] pairs
//! each face with the closest previous centre instead.
//!
//! Only horizontal shift matters for tilt; vertical motion and changes in
//! face area (leaning in or out) are ignored.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::classifier::{DetectionParams, ObjectClassifier};
use crate::cooldown::Cooldown;
use crate::error::ConfigError;
use crate::geometry::FaceObservation;
use crate::warning::Warning;

pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 0.15;
pub const DEFAULT_HISTORY_SIZE: usize = 10;
pub const DEFAULT_TILT_THRESHOLD: f64 = 0.06;
pub const DEFAULT_TILT_COOLDOWN: Duration = Duration::from_secs(5);

/// Reported direction of a head tilt.
///
/// A positive shift of the normalized centre x (towards the image's right
/// edge) is labelled `Left`, a negative one `Right`. Clients depend on this
/// mapping; it is not the on-screen direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TiltDirection {
    Left,
    Right,
}

impl TiltDirection {
    fn from_shift(x_shift: f64) -> Self {
        if x_shift > 0.0 {
            TiltDirection::Left
        } else {
            TiltDirection::Right
        }
    }
}

impl fmt::Display for TiltDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TiltDirection::Left => f.write_str("left"),
            TiltDirection::Right => f.write_str("right"),
        }
    }
}

/// How faces in the current frame are matched to the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacePairing {
    /// i-th face now against i-th face before; extra faces are unpaired.
    #[default]
    Index,
    /// Each current face against the previous face with the nearest centre.
    NearestCentroid,
}

impl std::str::FromStr for FacePairing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "index" => Ok(FacePairing::Index),
            "nearest" | "nearest-centroid" | "nearest_centroid" => {
                Ok(FacePairing::NearestCentroid)
            }
            _ => Err(ConfigError::Pairing(s.to_string())),
        }
    }
}

/// Tuning for a [`FaceMovementDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMonitorConfig {
    /// 0..=1; higher is stricter (fewer false positives, more misses).
    pub min_detection_confidence: f64,
    /// Reserved general movement sensitivity. Tilt checks use
    /// `tilt_threshold` only.
    pub movement_threshold: f64,
    /// Maximum number of per-frame snapshots retained.
    pub history_size: usize,
    /// Minimum normalized horizontal centre shift counted as a tilt.
    pub tilt_threshold: f64,
    /// Minimum interval between two head-tilt warnings.
    pub warning_cooldown: Duration,
    pub pairing: FacePairing,
}

impl Default for FaceMonitorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            history_size: DEFAULT_HISTORY_SIZE,
            tilt_threshold: DEFAULT_TILT_THRESHOLD,
            warning_cooldown: DEFAULT_TILT_COOLDOWN,
            pairing: FacePairing::Index,
        }
    }
}

impl FaceMonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let confidence = self.min_detection_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfigError::Confidence(confidence));
        }
        for (name, value) in [
            ("movement_threshold", self.movement_threshold),
            ("tilt_threshold", self.tilt_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        if self.history_size == 0 {
            return Err(ConfigError::ZeroHistory("history_size"));
        }
        Ok(())
    }

    /// Classifier parameters derived from `min_detection_confidence`.
    pub fn face_params(&self) -> DetectionParams {
        DetectionParams::from_confidence(self.min_detection_confidence)
    }
}

/// Outcome of processing one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnalysis {
    pub faces_count: usize,
    pub tilt_detected: bool,
    pub tilt_direction: Option<TiltDirection>,
    /// Empty for a clean frame.
    pub warnings: Vec<String>,
}

impl FrameAnalysis {
    fn no_frame() -> Self {
        Self {
            faces_count: 0,
            tilt_detected: false,
            tilt_direction: None,
            warnings: vec![Warning::NoFrame.to_string()],
        }
    }
}

/// Per-session head-movement detector.
///
/// Not synchronized: the owner must serialize calls to
/// [`process_frame`](Self::process_frame).
pub struct FaceMovementDetector {
    config: FaceMonitorConfig,
    face_params: DetectionParams,
    eye_params: DetectionParams,
    face_classifier: Arc<dyn ObjectClassifier>,
    eye_classifier: Option<Arc<dyn ObjectClassifier>>,
    history: VecDeque<Vec<FaceObservation>>,
    tilt_cooldown: Cooldown,
}

impl FaceMovementDetector {
    pub fn new(
        config: FaceMonitorConfig,
        face_classifier: Arc<dyn ObjectClassifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            face_params: config.face_params(),
            eye_params: DetectionParams::default(),
            face_classifier,
            eye_classifier: None,
            history: VecDeque::with_capacity(config.history_size),
            tilt_cooldown: Cooldown::new(config.warning_cooldown),
            config,
        })
    }

    /// Enable the per-face eye plausibility check.
    pub fn with_eye_classifier(mut self, eye_classifier: Arc<dyn ObjectClassifier>) -> Self {
        self.eye_classifier = Some(eye_classifier);
        self
    }

    /// Whether faces are checked for eyes.
    pub fn eye_validation(&self) -> bool {
        self.eye_classifier.is_some()
    }

    /// Per-frame snapshots, oldest first.
    pub fn history(&self) -> &VecDeque<Vec<FaceObservation>> {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.tilt_cooldown.reset();
    }

    /// Analyse one frame; `None` means the caller had no frame to give.
    pub fn process_frame(&mut self, frame: Option<&RgbImage>) -> FrameAnalysis {
        self.process_frame_at(frame, Instant::now())
    }

    /// [`process_frame`](Self::process_frame) with an explicit clock reading.
    pub fn process_frame_at(&mut self, frame: Option<&RgbImage>, now: Instant) -> FrameAnalysis {
        let Some(frame) = frame else {
            return FrameAnalysis::no_frame();
        };

        let gray = image::imageops::grayscale(frame);
        let (width, height) = gray.dimensions();
        let faces = self.face_classifier.detect(&gray, &self.face_params);

        let mut warnings = Vec::new();
        let faces_count = faces.len();
        match faces_count {
            0 => warnings.push(Warning::NoFace),
            1 => {}
            n => {
                tracing::debug!(faces = n, "multiple faces in frame");
                warnings.push(Warning::MultipleFaces(n));
            }
        }

        let mut current = Vec::with_capacity(faces_count);
        for bbox in &faces {
            if let Some(obs) = FaceObservation::from_box(bbox, width, height) {
                current.push(obs);
            }
            if !self.eyes_visible(&gray, bbox.x, bbox.y, bbox.width, bbox.height) {
                warnings.push(Warning::NoEyesVisible);
            }
        }

        let mut tilt_detected = false;
        let mut tilt_direction = None;
        if let Some(previous) = self.history.back() {
            for (curr, prev) in pair_faces(self.config.pairing, &current, previous) {
                let x_shift = curr.center_x - prev.center_x;
                if x_shift.abs() <= self.config.tilt_threshold {
                    continue;
                }
                let direction = TiltDirection::from_shift(x_shift);
                tilt_detected = true;
                tilt_direction = Some(direction);

                if self.tilt_cooldown.try_fire(now) {
                    tracing::debug!(%direction, x_shift, "head tilt detected");
                    warnings.push(Warning::HeadTilt(direction));
                } else {
                    tracing::trace!(%direction, x_shift, "head tilt warning suppressed by cooldown");
                }
            }
        }

        self.history.push_back(current);
        while self.history.len() > self.config.history_size {
            self.history.pop_front();
        }

        FrameAnalysis {
            faces_count,
            tilt_detected,
            tilt_direction,
            warnings: warnings.iter().map(ToString::to_string).collect(),
        }
    }

    /// Run the eye classifier over the face region. Passes when no eye
    /// classifier is configured.
    fn eyes_visible(&self, gray: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> bool {
        let Some(eye_classifier) = &self.eye_classifier else {
            return true;
        };
        let roi = image::imageops::crop_imm(gray, x, y, w, h).to_image();
        !eye_classifier.detect(&roi, &self.eye_params).is_empty()
    }
}

fn pair_faces<'a>(
    pairing: FacePairing,
    current: &'a [FaceObservation],
    previous: &'a [FaceObservation],
) -> Vec<(&'a FaceObservation, &'a FaceObservation)> {
    match pairing {
        FacePairing::Index => current.iter().zip(previous.iter()).collect(),
        FacePairing::NearestCentroid => current
            .iter()
            .filter_map(|curr| {
                previous
                    .iter()
                    .min_by(|a, b| {
                        curr.center_distance(a)
                            .total_cmp(&curr.center_distance(b))
                    })
                    .map(|prev| (curr, prev))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use std::sync::Mutex;

    const FRAME_W: u32 = 1000;
    const FRAME_H: u32 = 100;

    /// Returns one scripted detection list per call; empty once exhausted.
    struct ScriptedClassifier {
        script: Mutex<VecDeque<Vec<BoundingBox>>>,
        seen_params: Mutex<Vec<DetectionParams>>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Vec<BoundingBox>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen_params: Mutex::new(Vec::new()),
            })
        }
    }

    impl ObjectClassifier for ScriptedClassifier {
        fn detect(&self, _image: &GrayImage, params: &DetectionParams) -> Vec<BoundingBox> {
            self.seen_params.lock().unwrap().push(*params);
            self.script.lock().unwrap().pop_front().unwrap_or_default()
        }
    }

    /// Always returns the same boxes.
    struct FixedClassifier(Vec<BoundingBox>);

    impl ObjectClassifier for FixedClassifier {
        fn detect(&self, _image: &GrayImage, _params: &DetectionParams) -> Vec<BoundingBox> {
            self.0.clone()
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(FRAME_W, FRAME_H)
    }

    /// A 100×50 face whose left edge sits at `x`.
    fn face_at(x: u32) -> BoundingBox {
        BoundingBox::new(x, 25, 100, 50)
    }

    fn detector(script: Vec<Vec<BoundingBox>>) -> FaceMovementDetector {
        FaceMovementDetector::new(FaceMonitorConfig::default(), ScriptedClassifier::new(script))
            .unwrap()
    }

    #[test]
    fn test_no_frame_is_fixed_and_stateless() {
        let mut det = detector(vec![vec![face_at(0)]]);
        for _ in 0..3 {
            let result = det.process_frame(None);
            assert_eq!(result.faces_count, 0);
            assert!(!result.tilt_detected);
            assert_eq!(result.tilt_direction, None);
            assert_eq!(result.warnings, vec!["No frame received".to_string()]);
        }
        assert!(det.history().is_empty());
    }

    #[test]
    fn test_single_face_clean_frame() {
        let mut det = detector(vec![vec![face_at(450)]]);
        let result = det.process_frame(Some(&frame()));
        assert_eq!(result.faces_count, 1);
        assert!(result.warnings.is_empty());
        assert_eq!(det.history().len(), 1);
        let obs = det.history()[0][0];
        assert!((obs.center_x - 0.5).abs() < 1e-12);
        assert!((obs.center_y - 0.5).abs() < 1e-12);
        assert!((obs.area - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_no_face_warns_and_records_empty_snapshot() {
        let mut det = detector(vec![vec![]]);
        let result = det.process_frame(Some(&frame()));
        assert_eq!(result.faces_count, 0);
        assert_eq!(result.warnings, vec!["No face detected".to_string()]);
        assert_eq!(det.history().len(), 1);
        assert!(det.history()[0].is_empty());
    }

    #[test]
    fn test_multiple_faces_counted() {
        let mut det = detector(vec![vec![face_at(0), face_at(300), face_at(600)]]);
        let result = det.process_frame(Some(&frame()));
        assert_eq!(result.faces_count, 3);
        assert!(result
            .warnings
            .contains(&"Multiple faces detected (3 faces)".to_string()));
    }

    #[test]
    fn test_face_params_follow_confidence() {
        let classifier = ScriptedClassifier::new(vec![vec![]]);
        let config = FaceMonitorConfig {
            min_detection_confidence: 0.9,
            ..Default::default()
        };
        let mut det = FaceMovementDetector::new(config, classifier.clone()).unwrap();
        det.process_frame(Some(&frame()));

        let seen = classifier.seen_params.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].scale_factor - 1.12).abs() < 1e-9);
        assert_eq!(seen[0].min_neighbors, 4);
        assert_eq!(seen[0].min_size, (30, 30));
    }

    #[test]
    fn test_history_bounded() {
        let script = (0..25).map(|_| vec![face_at(450)]).collect();
        let mut det = detector(script);
        for n in 1..=25 {
            det.process_frame(Some(&frame()));
            assert_eq!(det.history().len(), n.min(DEFAULT_HISTORY_SIZE));
        }
    }

    #[test]
    fn test_tilt_just_above_threshold() {
        // centre x: 0.05 -> 0.111, shift 0.061
        let mut det = detector(vec![vec![face_at(0)], vec![face_at(61)]]);
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(result.tilt_detected);
        assert_eq!(result.tilt_direction, Some(TiltDirection::Left));
        assert_eq!(result.warnings, vec!["Head tilt detected (left)".to_string()]);
    }

    #[test]
    fn test_tilt_just_below_threshold() {
        // shift 0.059
        let mut det = detector(vec![vec![face_at(0)], vec![face_at(59)]]);
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(!result.tilt_detected);
        assert_eq!(result.tilt_direction, None);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_negative_shift_is_right() {
        let mut det = detector(vec![vec![face_at(500)], vec![face_at(400)]]);
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(result.tilt_detected);
        assert_eq!(result.tilt_direction, Some(TiltDirection::Right));
        assert_eq!(result.warnings, vec!["Head tilt detected (right)".to_string()]);
    }

    #[test]
    fn test_vertical_and_area_changes_ignored() {
        let mut det = detector(vec![
            vec![BoundingBox::new(450, 0, 100, 20)],
            vec![BoundingBox::new(450, 60, 100, 40)],
        ]);
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(!result.tilt_detected);
    }

    #[test]
    fn test_tilt_cooldown_suppresses_repeat_warning() {
        let mut det = detector(vec![
            vec![face_at(0)],
            vec![face_at(200)],
            vec![face_at(0)],
            vec![face_at(200)],
        ]);
        let t0 = Instant::now();
        det.process_frame_at(Some(&frame()), t0);
        let first = det.process_frame_at(Some(&frame()), t0 + Duration::from_millis(100));
        let second = det.process_frame_at(Some(&frame()), t0 + Duration::from_secs(1));
        let third = det.process_frame_at(Some(&frame()), t0 + Duration::from_secs(2));

        assert_eq!(first.warnings, vec!["Head tilt detected (left)".to_string()]);
        assert!(second.tilt_detected);
        assert_eq!(second.tilt_direction, Some(TiltDirection::Right));
        assert!(second.warnings.is_empty());
        assert!(third.tilt_detected);
        assert!(third.warnings.is_empty());
    }

    #[test]
    fn test_tilt_warning_resumes_after_cooldown() {
        let mut det = detector(vec![vec![face_at(0)], vec![face_at(200)], vec![face_at(0)]]);
        let t0 = Instant::now();
        det.process_frame_at(Some(&frame()), t0);
        det.process_frame_at(Some(&frame()), t0);
        let later = det.process_frame_at(Some(&frame()), t0 + Duration::from_secs(6));
        assert_eq!(later.warnings, vec!["Head tilt detected (right)".to_string()]);
    }

    #[test]
    fn test_no_tilt_after_faceless_frame() {
        let mut det = detector(vec![vec![face_at(0)], vec![], vec![face_at(500)]]);
        det.process_frame(Some(&frame()));
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(!result.tilt_detected);
    }

    #[test]
    fn test_null_frame_does_not_break_pairing() {
        let mut det = detector(vec![vec![face_at(0)], vec![face_at(200)]]);
        det.process_frame(Some(&frame()));
        det.process_frame(None);
        let result = det.process_frame(Some(&frame()));
        assert!(result.tilt_detected);
    }

    #[test]
    fn test_index_pairing_compares_by_position() {
        // The same two faces, reported in swapped order
        let mut det = detector(vec![
            vec![face_at(100), face_at(700)],
            vec![face_at(700), face_at(100)],
        ]);
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(result.tilt_detected);
        // Last pair (0.75 -> 0.15) wins the direction
        assert_eq!(result.tilt_direction, Some(TiltDirection::Right));
        // One warning only: the second pair is inside the cooldown
        assert_eq!(
            result
                .warnings
                .iter()
                .filter(|w| w.starts_with("Head tilt"))
                .count(),
            1
        );
    }

    #[test]
    fn test_nearest_centroid_pairing_ignores_reordering() {
        let config = FaceMonitorConfig {
            pairing: FacePairing::NearestCentroid,
            ..Default::default()
        };
        let classifier = ScriptedClassifier::new(vec![
            vec![face_at(100), face_at(700)],
            vec![face_at(700), face_at(100)],
        ]);
        let mut det = FaceMovementDetector::new(config, classifier).unwrap();
        det.process_frame(Some(&frame()));
        let result = det.process_frame(Some(&frame()));
        assert!(!result.tilt_detected);
    }

    #[test]
    fn test_missing_eyes_warned_per_face() {
        let mut det = detector(vec![vec![face_at(0), face_at(500)]])
            .with_eye_classifier(Arc::new(FixedClassifier(vec![])));
        let result = det.process_frame(Some(&frame()));
        assert_eq!(result.faces_count, 2);
        assert_eq!(
            result
                .warnings
                .iter()
                .filter(|w| *w == "Face detected but no eyes visible")
                .count(),
            2
        );
    }

    #[test]
    fn test_visible_eyes_pass() {
        let eyes = vec![BoundingBox::new(10, 10, 8, 8), BoundingBox::new(60, 10, 8, 8)];
        let mut det = detector(vec![vec![face_at(450)]])
            .with_eye_classifier(Arc::new(FixedClassifier(eyes)));
        let result = det.process_frame(Some(&frame()));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_reset_clears_history() {
        let mut det = detector(vec![vec![face_at(0)], vec![face_at(200)]]);
        det.process_frame(Some(&frame()));
        det.reset();
        assert!(det.history().is_empty());
        let result = det.process_frame(Some(&frame()));
        assert!(!result.tilt_detected);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let classifier = ScriptedClassifier::new(vec![]);
        let bad_confidence = FaceMonitorConfig {
            min_detection_confidence: 1.5,
            ..Default::default()
        };
        assert_eq!(
            FaceMovementDetector::new(bad_confidence, classifier.clone()).err(),
            Some(ConfigError::Confidence(1.5))
        );

        let zero_history = FaceMonitorConfig {
            history_size: 0,
            ..Default::default()
        };
        assert!(FaceMovementDetector::new(zero_history, classifier.clone()).is_err());

        let nan_tilt = FaceMonitorConfig {
            tilt_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(FaceMovementDetector::new(nan_tilt, classifier).is_err());
    }

    #[test]
    fn test_pairing_from_str() {
        assert_eq!("index".parse::<FacePairing>(), Ok(FacePairing::Index));
        assert_eq!(
            "Nearest".parse::<FacePairing>(),
            Ok(FacePairing::NearestCentroid)
        );
        assert_eq!(
            "random".parse::<FacePairing>(),
            Err(ConfigError::Pairing("random".to_string()))
        );
    }

    #[test]
    fn test_analysis_serializes_null_direction() {
        let analysis = FrameAnalysis::no_frame();
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["tilt_direction"], serde_json::Value::Null);
        assert_eq!(json["faces_count"], 0);

        let tilted = FrameAnalysis {
            tilt_direction: Some(TiltDirection::Left),
            ..analysis
        };
        assert_eq!(serde_json::to_value(&tilted).unwrap()["tilt_direction"], "left");
    }
}
