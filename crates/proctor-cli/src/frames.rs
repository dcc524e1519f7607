//! `proctor frames`: offline head-movement analysis of an image sequence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use image::RgbImage;
use proctor_core::{
    BlazefaceEyeClassifier, FaceMonitorConfig, FaceMovementDetector, FacePairing, FrameAnalysis,
    RustfaceClassifier, DEFAULT_EYE_CONFIDENCE,
};
use serde::Serialize;

#[derive(Args)]
pub struct FramesArgs {
    /// Frames to analyse, in capture order
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// SeetaFace model file (default: $PROCTOR_MODEL_PATH or the data dir)
    #[arg(long)]
    model: Option<PathBuf>,
    /// BlazeFace ONNX model; enables the per-face eye check
    #[arg(long)]
    eye_model: Option<PathBuf>,
    /// Anchor score the eye model must reach
    #[arg(long, default_value_t = DEFAULT_EYE_CONFIDENCE)]
    eye_confidence: f32,
    /// Capture rate used to space frames on the cooldown clock
    #[arg(long, default_value_t = 5.0)]
    fps: f64,
    #[arg(long, default_value_t = 0.5)]
    min_detection_confidence: f64,
    #[arg(long, default_value_t = 0.06)]
    tilt_threshold: f64,
    #[arg(long, default_value_t = 10)]
    history_size: usize,
    #[arg(long, default_value_t = 5)]
    tilt_cooldown_secs: u64,
    /// Face pairing across frames: index or nearest
    #[arg(long, default_value = "index")]
    pairing: String,
}

impl FramesArgs {
    fn monitor_config(&self) -> Result<FaceMonitorConfig> {
        let pairing: FacePairing = self.pairing.parse()?;
        Ok(FaceMonitorConfig {
            min_detection_confidence: self.min_detection_confidence,
            tilt_threshold: self.tilt_threshold,
            history_size: self.history_size,
            warning_cooldown: Duration::from_secs(self.tilt_cooldown_secs),
            pairing,
            ..Default::default()
        })
    }
}

#[derive(Serialize)]
struct FrameLine<'a> {
    frame: &'a Path,
    #[serde(flatten)]
    result: FrameAnalysis,
}

/// Determine the model path the same way the daemon does.
fn default_model_path() -> PathBuf {
    if let Ok(path) = std::env::var("PROCTOR_MODEL_PATH") {
        return PathBuf::from(path);
    }
    let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.local/share")
    });
    PathBuf::from(data_home).join("proctor/seeta_fd_frontal_v1.0.bin")
}

/// Offset of frame `index` from the first frame at `fps`, or `None` when
/// it does not fit a `Duration`.
fn frame_offset(index: usize, fps: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(index as f64 / fps).ok()
}

fn load_frame(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable frame");
            None
        }
    }
}

pub fn run(args: FramesArgs) -> Result<()> {
    if !(args.fps.is_finite() && args.fps > 0.0) {
        bail!("--fps must be a positive number, got {}", args.fps);
    }

    let model_path = args.model.clone().unwrap_or_else(default_model_path);
    let classifier = RustfaceClassifier::load(&model_path)
        .with_context(|| format!("failed to load face model {}", model_path.display()))?;
    let mut detector = FaceMovementDetector::new(args.monitor_config()?, Arc::new(classifier))
        .context("invalid detector configuration")?;
    if let Some(eye_model) = &args.eye_model {
        let eyes = BlazefaceEyeClassifier::load(eye_model, args.eye_confidence)
            .with_context(|| format!("failed to load eye model {}", eye_model.display()))?;
        detector = detector.with_eye_classifier(Arc::new(eyes));
    }

    let start = Instant::now();
    for (i, path) in args.images.iter().enumerate() {
        let now = frame_offset(i, args.fps)
            .and_then(|offset| start.checked_add(offset))
            .with_context(|| format!("frame {i} is out of clock range at --fps {}", args.fps))?;
        let frame = load_frame(path);
        let result = detector.process_frame_at(frame.as_ref(), now);
        let line = FrameLine {
            frame: path,
            result,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}
