use std::path::PathBuf;

use thiserror::Error;

/// Rejected detector configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("min_detection_confidence must be within [0, 1], got {0}")]
    Confidence(f64),
    #[error("{name} must be a finite, non-negative number, got {value}")]
    Threshold { name: &'static str, value: f64 },
    #[error("{0} must be greater than zero")]
    ZeroHistory(&'static str),
    #[error("unknown face pairing mode {0:?} (expected \"index\" or \"nearest\")")]
    Pairing(String),
    #[error("forbidden combination #{0} has no keys")]
    EmptyCombination(usize),
}

/// Failure to load a classifier model from disk.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("model not found: {0}")]
    MissingModel(PathBuf),
    #[error("failed to load model {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create inference session for {path}: {message}")]
    Session { path: PathBuf, message: String },
}
