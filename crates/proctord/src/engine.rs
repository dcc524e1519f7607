use proctor_core::{ConfigError, FrameAnalysis, KeyEvent};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::frame::decode_frame;
use crate::registry::{SessionRegistry, SessionSummary};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid detector configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("session limit reached ({0} active sessions)")]
    TooManySessions(usize),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    StartSession {
        session_id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    ClearSession {
        session_id: String,
        reply: oneshot::Sender<bool>,
    },
    ProcessFrame {
        session_id: String,
        encoded: Vec<u8>,
        reply: oneshot::Sender<Result<FrameAnalysis, EngineError>>,
    },
    TrackKey {
        session_id: String,
        event: KeyEvent,
        reply: oneshot::Sender<Result<Option<Vec<String>>, EngineError>>,
    },
    SetAllowedKeys {
        session_id: String,
        keys: Vec<String>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetForbiddenCombinations {
        session_id: String,
        combinations: Vec<Vec<String>>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetKeyboardActive {
        session_id: String,
        active: bool,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    ResetKeyboard {
        session_id: String,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Create (or reset) the detectors for a session.
    pub async fn start_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::StartSession { session_id, reply })
            .await?
    }

    /// Drop a session's detectors. Returns whether it existed.
    pub async fn clear_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::ClearSession { session_id, reply })
            .await
    }

    /// Decode and analyse one frame; empty bytes stand for "no frame".
    pub async fn process_frame(
        &self,
        session_id: &str,
        encoded: Vec<u8>,
    ) -> Result<FrameAnalysis, EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::ProcessFrame {
            session_id,
            encoded,
            reply,
        })
        .await?
    }

    pub async fn track_key(
        &self,
        session_id: &str,
        event: KeyEvent,
    ) -> Result<Option<Vec<String>>, EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::TrackKey {
            session_id,
            event,
            reply,
        })
        .await?
    }

    pub async fn set_allowed_keys(
        &self,
        session_id: &str,
        keys: Vec<String>,
    ) -> Result<(), EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::SetAllowedKeys {
            session_id,
            keys,
            reply,
        })
        .await?
    }

    pub async fn set_forbidden_combinations(
        &self,
        session_id: &str,
        combinations: Vec<Vec<String>>,
    ) -> Result<(), EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::SetForbiddenCombinations {
            session_id,
            combinations,
            reply,
        })
        .await?
    }

    /// Turn a session's keyboard tracking on or off.
    pub async fn set_keyboard_active(
        &self,
        session_id: &str,
        active: bool,
    ) -> Result<(), EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::SetKeyboardActive {
            session_id,
            active,
            reply,
        })
        .await?
    }

    /// Forget a session's held keys, key history and keyboard cooldown.
    /// Returns whether the session existed.
    pub async fn reset_keyboard(&self, session_id: &str) -> Result<bool, EngineError> {
        let session_id = session_id.to_string();
        self.request(|reply| EngineRequest::ResetKeyboard { session_id, reply })
            .await
    }

    pub async fn status(&self) -> Result<Vec<SessionSummary>, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the registry, so every call for every session is
/// handled one at a time, in arrival order.
pub fn spawn_engine(mut registry: SessionRegistry) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(32);

    std::thread::Builder::new()
        .name("proctor-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut registry, req);
            }
            tracing::info!(sessions = registry.len(), "engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn handle_request(registry: &mut SessionRegistry, req: EngineRequest) {
    match req {
        EngineRequest::StartSession { session_id, reply } => {
            let _ = reply.send(registry.start(&session_id));
        }
        EngineRequest::ClearSession { session_id, reply } => {
            let _ = reply.send(registry.clear(&session_id));
        }
        EngineRequest::ProcessFrame {
            session_id,
            encoded,
            reply,
        } => {
            let result = registry.get_or_create(&session_id).map(|session| {
                let frame = decode_frame(&encoded);
                let analysis = session.face.process_frame(frame.as_ref());
                if !analysis.warnings.is_empty() {
                    tracing::debug!(
                        session = %session_id,
                        faces = analysis.faces_count,
                        warnings = ?analysis.warnings,
                        "frame raised warnings"
                    );
                }
                analysis
            });
            let _ = reply.send(result);
        }
        EngineRequest::TrackKey {
            session_id,
            event,
            reply,
        } => {
            let result = registry
                .get_or_create(&session_id)
                .map(|session| session.keyboard.track(&event));
            let _ = reply.send(result);
        }
        EngineRequest::SetAllowedKeys {
            session_id,
            keys,
            reply,
        } => {
            let result = registry.get_or_create(&session_id).map(|session| {
                tracing::info!(session = %session_id, count = keys.len(), "allow-list replaced");
                session.keyboard.set_allowed_keys(keys);
            });
            let _ = reply.send(result);
        }
        EngineRequest::SetForbiddenCombinations {
            session_id,
            combinations,
            reply,
        } => {
            let result = registry.get_or_create(&session_id).and_then(|session| {
                let count = combinations.len();
                session.keyboard.set_forbidden_combinations(combinations)?;
                tracing::info!(session = %session_id, count, "forbidden combinations replaced");
                Ok(())
            });
            let _ = reply.send(result);
        }
        EngineRequest::SetKeyboardActive {
            session_id,
            active,
            reply,
        } => {
            let result = registry.get_or_create(&session_id).map(|session| {
                tracing::info!(session = %session_id, active, "keyboard tracking toggled");
                session.keyboard.set_active(active);
            });
            let _ = reply.send(result);
        }
        EngineRequest::ResetKeyboard { session_id, reply } => {
            let found = match registry.get_mut(&session_id) {
                Some(session) => {
                    session.keyboard.reset();
                    tracing::debug!(session = %session_id, "keyboard state reset");
                    true
                }
                None => false,
            };
            let _ = reply.send(found);
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(registry.summaries());
        }
    }
}
