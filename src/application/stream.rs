//! `start_or_resume`: asset id in, playlist URL out.

use super::readiness::{is_ready, wait_until_ready, ReadinessPolicy};
use super::registry::SessionRegistry;
use crate::domain::asset::AssetId;
use crate::domain::layout::OutputLayout;
use crate::domain::plan::EncodePlanner;
use crate::domain::session::Session;
use crate::error::StreamError;
use crate::ports::catalog::AssetCatalog;
use crate::ports::encoder::{EncodeLauncher, LaunchRequest};
use std::sync::Arc;

/// What to do when the encoder is running but no output showed up in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Stop the encoder and report [`StreamError::ReadinessTimeout`].
    #[default]
    Fail,
    /// Keep the encoder, mark the session ready and hand out the URL anyway.
    Optimistic,
}

impl TimeoutPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" | "strict" => Some(TimeoutPolicy::Fail),
            "optimistic" => Some(TimeoutPolicy::Optimistic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub layout: OutputLayout,
    pub planner: EncodePlanner,
    pub readiness: ReadinessPolicy,
    pub timeout_policy: TimeoutPolicy,
}

pub struct StreamService<C, E> {
    catalog: Arc<C>,
    encoder: Arc<E>,
    settings: StreamSettings,
    registry: Arc<SessionRegistry>,
}

impl<C, E> StreamService<C, E>
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    pub fn new(catalog: C, encoder: E, settings: StreamSettings) -> Self {
        Self {
            catalog: Arc::new(catalog),
            encoder: Arc::new(encoder),
            settings,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Returns the playlist URL for the asset, starting an encoder if needed.
    /// Repeated calls for a ready session return the same URL and start nothing.
    pub async fn start_or_resume(&self, id: AssetId) -> Result<String, StreamError> {
        let paths = self.settings.layout.paths_for(id);
        let start = StartRoutine {
            catalog: self.catalog.clone(),
            encoder: self.encoder.clone(),
            settings: self.settings.clone(),
        };
        self.registry
            .get_or_start(id, paths, move |session| start.run(session))
            .await
    }

    pub fn stop(&self, id: AssetId) -> bool {
        self.registry.teardown(id)
    }

    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }
}

struct StartRoutine<C, E> {
    catalog: Arc<C>,
    encoder: Arc<E>,
    settings: StreamSettings,
}

impl<C, E> StartRoutine<C, E>
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    async fn run(self, session: Arc<Session>) -> Result<(), StreamError> {
        let id = session.asset_id();
        let asset = self
            .catalog
            .find(id)
            .await?
            .ok_or(StreamError::AssetNotFound(id))?;

        let paths = session.paths();
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .map_err(|e| StreamError::output_dir(&paths.dir, e))?;
        let stale = paths
            .clear_stale()
            .await
            .map_err(|e| StreamError::output_dir(&paths.dir, e))?;
        if stale > 0 {
            tracing::debug!(asset_id = id, files = stale, "removed stale output");
        }

        let plan = self.settings.planner.plan(&asset, paths);
        tracing::info!(
            asset_id = id,
            remux = plan.remux_only,
            backend = %plan.backend,
            video = %asset.video_codec,
            audio = %asset.audio_codec,
            dir = ?paths.dir,
            "launching encoder"
        );
        let cancel = session.cancel_token();
        let handle = self.encoder.launch(LaunchRequest {
            asset_id: id,
            plan,
            output_dir: paths.dir.clone(),
            cancel: cancel.clone(),
        })?;
        session.attach_encoder(handle.clone());

        let readiness = self.settings.readiness;
        let ready = tokio::select! {
            ready = wait_until_ready(paths, readiness) => ready,
            outcome = handle.wait() => {
                // A short source can be fully written before the first poll.
                if !is_ready(&paths.playlist, &paths.dir).await {
                    return Err(StreamError::EncodeExited { outcome });
                }
                true
            }
            _ = cancel.cancelled() => return Err(StreamError::SessionCancelled(id)),
        };
        if ready {
            return Ok(());
        }

        match self.settings.timeout_policy {
            TimeoutPolicy::Fail => Err(StreamError::ReadinessTimeout {
                asset_id: id,
                waited: readiness.budget(),
            }),
            TimeoutPolicy::Optimistic => {
                tracing::warn!(
                    asset_id = id,
                    waited = ?readiness.budget(),
                    "no output yet, handing out playlist URL anyway"
                );
                Ok(())
            }
        }
    }
}
