//! Bookkeeping for one asset's streaming preparation.

use super::asset::AssetId;
use super::layout::OutputPaths;
use crate::error::StreamError;
use crate::ports::encoder::EncodeHandle;
use serde::Serialize;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum SessionState {
    Starting,
    Ready,
    Failed(StreamError),
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct Session {
    asset_id: AssetId,
    /// Distinguishes successive sessions of the same asset
    generation: u64,
    paths: OutputPaths,
    created_at: SystemTime,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    encoder: OnceLock<EncodeHandle>,
    last_access: Mutex<Instant>,
}

impl Session {
    pub fn new(asset_id: AssetId, generation: u64, paths: OutputPaths) -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            asset_id,
            generation,
            paths,
            created_at: SystemTime::now(),
            cancel: CancellationToken::new(),
            state,
            encoder: OnceLock::new(),
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// `starting -> ready`. Returns false if the session already settled.
    pub fn mark_ready(&self) -> bool {
        self.settle(SessionState::Ready)
    }

    /// `starting -> failed`. Returns false if the session already settled.
    pub fn mark_failed(&self, error: StreamError) -> bool {
        self.settle(SessionState::Failed(error))
    }

    fn settle(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if matches!(current, SessionState::Starting) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Waits for the session to leave `starting`.
    pub async fn settled(&self) -> Result<String, StreamError> {
        let mut rx = self.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                SessionState::Starting => {}
                SessionState::Ready => return Ok(self.paths.playlist_url.clone()),
                SessionState::Failed(e) => return Err(e),
            }
            if rx.changed().await.is_err() {
                return Err(StreamError::SessionCancelled(self.asset_id));
            }
        }
    }

    pub fn attach_encoder(&self, handle: EncodeHandle) {
        if self.encoder.set(handle).is_err() {
            tracing::warn!(asset_id = self.asset_id, "encoder already attached to session");
        }
    }

    pub fn encoder(&self) -> Option<&EncodeHandle> {
        self.encoder.get()
    }

    pub fn is_encoding(&self) -> bool {
        self.encoder.get().is_some_and(EncodeHandle::is_running)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Terminates the encoder and fails the session if it was still starting.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.mark_failed(StreamError::SessionCancelled(self.asset_id));
    }

    pub fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            asset_id: self.asset_id,
            generation: self.generation,
            state: self.state.borrow().label(),
            playlist_url: self.paths.playlist_url.clone(),
            created_at: self
                .created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            idle_secs: self.idle_for().as_secs(),
            encoder_pid: self.encoder.get().and_then(EncodeHandle::pid),
            encoding: self.is_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub asset_id: AssetId,
    pub generation: u64,
    pub state: &'static str,
    pub playlist_url: String,
    /// Unix seconds
    pub created_at: u64,
    pub idle_secs: u64,
    pub encoder_pid: Option<u32>,
    pub encoding: bool,
}
