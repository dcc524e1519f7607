//! Eye locator built on the BlazeFace short-range ONNX model, run through
//! ONNX Runtime via `ort`.
//!
//! BlazeFace regresses six facial keypoints per anchor; the first two are
//! the eyes. The classifier runs the model on a face crop and answers with
//! one small box around each eye keypoint of the best-scoring anchor.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use image::GrayImage;
use ort::session::Session;

use crate::classifier::{DetectionParams, ObjectClassifier};
use crate::error::BackendError;
use crate::geometry::BoundingBox;

/// Default anchor score an eye pair must reach.
pub const DEFAULT_EYE_CONFIDENCE: f32 = 0.5;

/// BlazeFace model input resolution.
const INPUT_SIZE: usize = 128;
/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;
/// Box (4) plus six keypoints (12) per anchor.
const REGRESSOR_WIDTH: usize = 16;
const EYE_KEYPOINTS: [usize; 2] = [0, 1];
/// Eye box side as a fraction of the decoded face width.
const EYE_BOX_FRACTION: f32 = 0.25;
const MIN_EYE_BOX: u32 = 2;

pub struct BlazefaceEyeClassifier {
    session: Mutex<Session>,
    anchors: Vec<[f32; 2]>,
    confidence: f32,
}

impl BlazefaceEyeClassifier {
    pub fn load(path: &Path, confidence: f32) -> Result<Self, BackendError> {
        if !path.exists() {
            return Err(BackendError::MissingModel(path.to_path_buf()));
        }
        let session = open_session(path).map_err(|e| BackendError::Session {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), confidence, "eye model loaded");
        Ok(Self {
            session: Mutex::new(session),
            anchors: generate_anchors(),
            confidence,
        })
    }

    fn locate_eyes(&self, roi: &GrayImage) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        let input = ort::value::Tensor::from_array(preprocess(roi))?;
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![input])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into());
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("cannot get score slice")?;

        Ok(decode_eyes(
            reg_data,
            score_data,
            &self.anchors,
            self.confidence,
            roi.dimensions(),
        ))
    }
}

fn open_session(path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    Ok(Session::builder()?.commit_from_file(path)?)
}

impl ObjectClassifier for BlazefaceEyeClassifier {
    /// Window parameters do not apply to an anchor-based model; the score
    /// threshold is fixed at load time.
    fn detect(&self, image: &GrayImage, _params: &DetectionParams) -> Vec<BoundingBox> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        match self.locate_eyes(image) {
            Ok(eyes) => eyes,
            Err(e) => {
                // Inference failure counts as eyes visible.
                tracing::warn!(error = %e, "eye inference failed");
                vec![BoundingBox::new(0, 0, width, height)]
            }
        }
    }
}

/// Resize a gray crop to `INPUT_SIZE` square, replicate it over three
/// channels and normalize to [0,1] NCHW float32.
fn preprocess(roi: &GrayImage) -> ndarray::Array4<f32> {
    let (src_w, src_h) = (roi.width() as usize, roi.height() as usize);
    let s = INPUT_SIZE;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            let value = roi.get_pixel(src_x as u32, src_y as u32)[0] as f32 / 255.0;
            for c in 0..3 {
                tensor[[0, c, y, x]] = value;
            }
        }
    }

    tensor
}

/// 16×16 grid with 2 anchors per cell, then 8×8 with 6; centres in [0,1].
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

/// Eye boxes, in crop pixels, for the best anchor scoring at least
/// `confidence`. Keypoints falling outside the crop are dropped.
fn decode_eyes(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    (width, height): (u32, u32),
) -> Vec<BoundingBox> {
    let best = scores
        .iter()
        .take(anchors.len())
        .enumerate()
        .map(|(i, &raw)| (i, sigmoid(raw)))
        .filter(|&(i, score)| {
            score >= confidence && (i + 1) * REGRESSOR_WIDTH <= regressors.len()
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((index, _)) = best else {
        return Vec::new();
    };

    let anchor = anchors[index];
    let reg = &regressors[index * REGRESSOR_WIDTH..(index + 1) * REGRESSOR_WIDTH];
    let face_width = reg[2] / INPUT_SIZE as f32 * width as f32;
    let side = ((face_width * EYE_BOX_FRACTION) as u32).max(MIN_EYE_BOX);

    EYE_KEYPOINTS
        .iter()
        .filter_map(|&k| {
            let kx = (anchor[0] + reg[4 + 2 * k] / INPUT_SIZE as f32) * width as f32;
            let ky = (anchor[1] + reg[5 + 2 * k] / INPUT_SIZE as f32) * height as f32;
            if !(0.0..width as f32).contains(&kx) || !(0.0..height as f32).contains(&ky) {
                return None;
            }
            let x0 = (kx as u32).saturating_sub(side / 2);
            let y0 = (ky as u32).saturating_sub(side / 2);
            let w = side.min(width - x0);
            let h = side.min(height - y0);
            Some(BoundingBox::new(x0, y0, w, h))
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
