use std::sync::Arc;

use anyhow::{Context, Result};
use proctor_core::{BackendError, BlazefaceEyeClassifier, ObjectClassifier, RustfaceClassifier};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod frame;
mod registry;

use config::Config;
use dbus_interface::{AppState, ProctorService, BUS_NAME, OBJECT_PATH};
use registry::{SessionFactory, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("proctord starting");

    let config = Config::from_env();

    let face_classifier: Arc<dyn ObjectClassifier> = Arc::new(
        RustfaceClassifier::load(&config.model_path).context("failed to load face model")?,
    );
    tracing::info!(path = %config.model_path.display(), "face classifier loaded");

    let eye_classifier: Option<Arc<dyn ObjectClassifier>> =
        match BlazefaceEyeClassifier::load(&config.eye_model_path, config.eye_confidence) {
            Ok(classifier) => {
                tracing::info!(path = %config.eye_model_path.display(), "eye classifier loaded");
                Some(Arc::new(classifier) as Arc<dyn ObjectClassifier>)
            }
            Err(BackendError::MissingModel(path)) => {
                tracing::warn!(
                    path = %path.display(),
                    "eye model not found, per-face eye validation disabled"
                );
                None
            }
            Err(e) => return Err(e).context("failed to load eye model"),
        };

    let eye_validation = eye_classifier.is_some();
    let factory = SessionFactory::new(
        config.face_config(),
        config.keyboard_config(),
        config.keyboard_enabled,
        face_classifier,
        eye_classifier,
    )
    .context("invalid detector configuration")?;
    let registry = SessionRegistry::new(factory, config.max_sessions);
    let engine = engine::spawn_engine(registry)?;

    let session_bus = config.session_bus;
    let service = ProctorService {
        state: Arc::new(AppState {
            config,
            engine,
            eye_validation,
        }),
    };

    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = BUS_NAME, session_bus, "proctord ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("proctord shutting down");

    Ok(())
}
