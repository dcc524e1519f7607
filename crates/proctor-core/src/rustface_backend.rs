//! Face classifier backend built on the `rustface` crate (SeetaFace engine).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::GrayImage;

use crate::classifier::{DetectionParams, ObjectClassifier};
use crate::error::BackendError;
use crate::geometry::BoundingBox;

/// SeetaFace refuses windows smaller than this.
const SEETA_MIN_FACE_SIZE: u32 = 20;
/// Score threshold at zero required neighbours.
const BASE_SCORE_THRESH: f64 = 1.0;
/// Threshold increase per required neighbour; 2 neighbours lands on the
/// SeetaFace default of 2.0.
const SCORE_PER_NEIGHBOR: f64 = 0.5;

/// Frontal face detector over a SeetaFace model file.
///
/// The model is parsed once; each `detect` call builds a fresh detector
/// from it so the classifier stays `Sync`.
pub struct RustfaceClassifier {
    model: rustface::Model,
}

impl RustfaceClassifier {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        if !path.exists() {
            return Err(BackendError::MissingModel(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| BackendError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let model =
            rustface::read_model(BufReader::new(file)).map_err(|source| BackendError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { model })
    }
}

impl ObjectClassifier for RustfaceClassifier {
    fn detect(&self, image: &GrayImage, params: &DetectionParams) -> Vec<BoundingBox> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(min_face_size(params));
        detector.set_score_thresh(score_thresh(params));
        detector.set_pyramid_scale_factor(pyramid_scale(params));
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(image.as_raw(), width, height));

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clamp_box(
                    bbox.x() as i64,
                    bbox.y() as i64,
                    bbox.width() as i64,
                    bbox.height() as i64,
                    width,
                    height,
                )
            })
            .collect()
    }
}

fn min_face_size(params: &DetectionParams) -> u32 {
    params.min_size.0.max(params.min_size.1).max(SEETA_MIN_FACE_SIZE)
}

fn score_thresh(params: &DetectionParams) -> f64 {
    BASE_SCORE_THRESH + params.min_neighbors as f64 * SCORE_PER_NEIGHBOR
}

/// SeetaFace shrinks the image by this factor per pyramid level.
fn pyramid_scale(params: &DetectionParams) -> f32 {
    (1.0 / params.scale_factor.max(1.01)) as f32
}

/// SeetaFace boxes may poke outside the image; clip them to it.
fn clamp_box(x: i64, y: i64, w: i64, h: i64, width: u32, height: u32) -> Option<BoundingBox> {
    let x0 = x.clamp(0, width as i64);
    let y0 = y.clamp(0, height as i64);
    let x1 = (x + w).clamp(0, width as i64);
    let y1 = (y + h).clamp(0, height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(BoundingBox::new(
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_mapping_defaults() {
        let params = DetectionParams::from_confidence(0.5);
        assert_eq!(min_face_size(&params), 30);
        assert!((score_thresh(&params) - 2.0).abs() < 1e-9);
        assert!((pyramid_scale(&params) - (1.0 / 1.2) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_min_face_size_floor() {
        let params = DetectionParams::default();
        assert_eq!(min_face_size(&params), SEETA_MIN_FACE_SIZE);
    }

    #[test]
    fn test_clamp_box_clips_to_image() {
        assert_eq!(
            clamp_box(-10, -5, 50, 40, 100, 100),
            Some(BoundingBox::new(0, 0, 40, 35))
        );
        assert_eq!(
            clamp_box(80, 90, 50, 50, 100, 100),
            Some(BoundingBox::new(80, 90, 20, 10))
        );
        assert_eq!(clamp_box(120, 0, 10, 10, 100, 100), None);
    }

    #[test]
    fn test_missing_model_reported() {
        let result = RustfaceClassifier::load(Path::new("/nonexistent/seeta.bin"));
        assert!(matches!(result, Err(BackendError::MissingModel(_))));
    }
}
