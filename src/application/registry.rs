//! Session registry: at most one encoder per asset.
//!
//! The first request for an asset becomes the leader and runs the start
//! routine on its own task; every other request for the same asset joins the
//! session and waits for the same outcome. Dropping a request never aborts a
//! start in progress.

use crate::domain::asset::AssetId;
use crate::domain::layout::OutputPaths;
use crate::domain::session::{Session, SessionState, SessionSummary};
use crate::error::StreamError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum Claim {
    Reuse(Arc<Session>),
    Join(Arc<Session>),
    Lead(Arc<Session>),
}

/// How long a failed start waits for its encoder to die before the failure
/// is published.
const ENCODER_EXIT_GRACE: Duration = Duration::from_secs(5);

type SessionMap = Mutex<HashMap<AssetId, Arc<Session>>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetId, Arc<Session>>> {
        lock_sessions(&self.sessions)
    }

    pub fn get(&self, id: AssetId) -> Option<Arc<Session>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the playlist URL of the asset's session, starting one with
    /// `start` when there is no usable session.
    ///
    /// `start` is invoked at most once per session. It resolves `Ok` once the
    /// output is servable; an error fails the session for every waiter and
    /// cancels the session scope.
    pub async fn get_or_start<F, Fut>(
        &self,
        id: AssetId,
        paths: OutputPaths,
        start: F,
    ) -> Result<String, StreamError>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
    {
        let session = match self.claim(id, &paths).await {
            Claim::Reuse(session) => {
                session.touch();
                tracing::debug!(asset_id = id, generation = session.generation(), "reusing ready session");
                return Ok(session.paths().playlist_url.clone());
            }
            Claim::Join(session) => {
                tracing::debug!(asset_id = id, generation = session.generation(), "joining session in progress");
                session
            }
            Claim::Lead(session) => {
                spawn_start(self.sessions.clone(), session.clone(), start(session.clone()));
                session
            }
        };
        session.touch();
        session.settled().await
    }

    async fn claim(&self, id: AssetId, paths: &OutputPaths) -> Claim {
        loop {
            let current = self.get(id);
            let expected = current.as_ref().map(|s| s.generation());

            if let Some(session) = current {
                match session.state() {
                    SessionState::Starting => return Claim::Join(session),
                    SessionState::Ready => {
                        if session.is_encoding() || playlist_exists(session.paths()).await {
                            return Claim::Reuse(session);
                        }
                        tracing::info!(
                            asset_id = id,
                            generation = session.generation(),
                            "playlist gone and encoder stopped, restarting"
                        );
                    }
                    SessionState::Failed(_) => {}
                }
            }

            if let Some(session) = self.replace(id, expected, paths) {
                return Claim::Lead(session);
            }
        }
    }

    /// Installs a fresh `starting` session if the slot still holds `expected`.
    fn replace(
        &self,
        id: AssetId,
        expected: Option<u64>,
        paths: &OutputPaths,
    ) -> Option<Arc<Session>> {
        let mut sessions = self.lock();
        if sessions.get(&id).map(|s| s.generation()) != expected {
            return None;
        }
        if let Some(previous) = sessions.get(&id) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Session::new(id, generation, paths.clone()));
        sessions.insert(id, session.clone());
        tracing::info!(asset_id = id, generation, "session starting");
        Some(session)
    }

    /// Cancels and forgets the asset's session.
    pub fn teardown(&self, id: AssetId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(session) => {
                session.cancel();
                tracing::info!(asset_id = id, generation = session.generation(), "session torn down");
                true
            }
            None => false,
        }
    }

    /// Tears down sessions nobody asked for within `max_idle`.
    /// Sessions still starting are left alone.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut evicted = Vec::new();
        self.lock().retain(|id, session| {
            let idle = session.idle_for();
            if matches!(session.state(), SessionState::Starting) || idle < max_idle {
                true
            } else {
                evicted.push((*id, session.clone(), idle));
                false
            }
        });
        for (id, session, idle) in &evicted {
            session.cancel();
            tracing::info!(asset_id = *id, idle_secs = idle.as_secs(), "idle session evicted");
        }
        evicted.len()
    }

    /// Cancels every session. Used on server shutdown.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, session) in &drained {
            session.cancel();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "cancelled all sessions");
        }
        drained.len()
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self.lock().values().map(|s| s.summary()).collect();
        summaries.sort_by_key(|s| s.asset_id);
        summaries
    }
}

fn lock_sessions(sessions: &SessionMap) -> MutexGuard<'_, HashMap<AssetId, Arc<Session>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn playlist_exists(paths: &OutputPaths) -> bool {
    tokio::fs::try_exists(&paths.playlist).await.unwrap_or(false)
}

/// Runs the start routine detached from the requesting task and settles the
/// session with its result.
///
/// A failed session leaves the map once its encoder is gone, so the next
/// request starts over on a clean output directory.
fn spawn_start<Fut>(sessions: Arc<SessionMap>, session: Arc<Session>, start: Fut)
where
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    let id = session.asset_id();
    tokio::spawn(async move {
        let result = match tokio::spawn(start).await {
            Ok(result) => result,
            Err(e) => Err(StreamError::Internal(format!("start task failed: {}", e))),
        };
        match result {
            Ok(()) => {
                if session.mark_ready() {
                    tracing::info!(asset_id = id, generation = session.generation(), "session ready");
                }
            }
            Err(e) => {
                session.cancel_token().cancel();
                if let Some(encoder) = session.encoder() {
                    if tokio::time::timeout(ENCODER_EXIT_GRACE, encoder.wait()).await.is_err() {
                        tracing::warn!(asset_id = id, pid = ?encoder.pid(), "encoder still running after cancel");
                    }
                }
                {
                    let mut sessions = lock_sessions(&sessions);
                    if sessions.get(&id).is_some_and(|s| s.generation() == session.generation()) {
                        sessions.remove(&id);
                    }
                }
                if session.mark_failed(e.clone()) {
                    tracing::warn!(asset_id = id, generation = session.generation(), error = %e, "session failed");
                }
            }
        }
    });
}

/// Periodically evicts idle sessions until `shutdown` is cancelled.
pub fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = registry.evict_idle(max_idle);
                    if evicted > 0 {
                        tracing::debug!(evicted, "idle sweep");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layout::OutputLayout;
    use crate::ports::encoder::{EncodeHandle, EncodeOutcome};
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    fn layout() -> (TempDir, OutputLayout) {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "/hls");
        (dir, layout)
    }

    async fn write_output(paths: &OutputPaths) {
        tokio::fs::create_dir_all(&paths.dir).await.unwrap();
        tokio::fs::write(paths.dir.join("seg_00000.ts"), b"ts").await.unwrap();
        tokio::fs::write(&paths.playlist, "#EXTM3U\n").await.unwrap();
    }

    /// Start routine that writes output after a short delay.
    fn producing(
        calls: Arc<AtomicUsize>,
    ) -> impl FnOnce(Arc<Session>) -> std::pin::Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send>>
    {
        move |session| {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                write_output(session.paths()).await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_start_once() {
        let (_dir, layout) = layout();
        let registry = Arc::new(SessionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let paths = layout.paths_for(9);
                let calls = calls.clone();
                tokio::spawn(async move { registry.get_or_start(9, paths, producing(calls)).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "/hls/9/master.m3u8");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].state, "ready");
    }

    #[tokio::test]
    async fn test_ready_session_is_reused() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = registry
            .get_or_start(1, layout.paths_for(1), producing(calls.clone()))
            .await
            .unwrap();
        let second = registry
            .get_or_start(1, layout.paths_for(1), producing(calls.clone()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(1).unwrap().generation(), 1);
    }

    #[tokio::test]
    async fn test_deleted_playlist_restarts() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry
            .get_or_start(2, layout.paths_for(2), producing(calls.clone()))
            .await
            .unwrap();
        let first = registry.get(2).unwrap();
        std::fs::remove_file(&layout.paths_for(2).playlist).unwrap();

        let url = registry
            .get_or_start(2, layout.paths_for(2), producing(calls.clone()))
            .await
            .unwrap();

        assert_eq!(url, "/hls/2/master.m3u8");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(first.is_cancelled());
        assert_eq!(registry.get(2).unwrap().generation(), first.generation() + 1);
    }

    #[tokio::test]
    async fn test_deleted_playlist_with_running_encoder_is_reused() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_reporter, handle) = EncodeHandle::new(Some(1));

        let start = {
            let calls = calls.clone();
            move |session: Arc<Session>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                session.attach_encoder(handle);
                write_output(session.paths()).await;
                Ok::<(), StreamError>(())
            }
        };
        registry.get_or_start(3, layout.paths_for(3), start).await.unwrap();
        std::fs::remove_file(&layout.paths_for(3).playlist).unwrap();

        registry
            .get_or_start(3, layout.paths_for(3), producing(calls.clone()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_and_allows_retry() {
        let (_dir, layout) = layout();
        let registry = Arc::new(SessionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: Arc<AtomicUsize>| {
            move |_session: Arc<Session>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<(), _>(StreamError::AssetNotFound(4))
            }
        };

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let paths = layout.paths_for(4);
                let start = failing(calls.clone());
                tokio::spawn(async move { registry.get_or_start(4, paths, start).await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(task.await.unwrap(), Err(StreamError::AssetNotFound(4))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.get(4).is_none());
        assert!(registry.is_empty());

        registry
            .get_or_start(4, layout.paths_for(4), producing(calls.clone()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_starts_do_not_accumulate() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        for id in 1000..1050 {
            let start = move |_session: Arc<Session>| async move {
                Err::<(), _>(StreamError::AssetNotFound(id))
            };
            registry.get_or_start(id, layout.paths_for(id), start).await.unwrap_err();
        }
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_failure_waits_for_encoder_exit() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        let (reporter, handle) = EncodeHandle::new(Some(77));
        let observed = handle.clone();

        let start = move |session: Arc<Session>| async move {
            let cancel = session.cancel_token();
            session.attach_encoder(handle);
            tokio::spawn(async move {
                cancel.cancelled().await;
                tokio::time::sleep(Duration::from_millis(40)).await;
                reporter.report(EncodeOutcome::Cancelled);
            });
            Err::<(), _>(StreamError::ReadinessTimeout {
                asset_id: 12,
                waited: Duration::from_millis(1),
            })
        };
        let err = registry.get_or_start(12, layout.paths_for(12), start).await.unwrap_err();

        assert_eq!(err.code(), "readiness_timeout");
        assert_eq!(observed.outcome(), Some(EncodeOutcome::Cancelled));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_start_fails_session() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        let start = |_session: Arc<Session>| async move {
            let outcome: Result<(), StreamError> = Ok(());
            if outcome.is_ok() {
                panic!("start routine crashed");
            }
            outcome
        };
        let err = registry.get_or_start(5, layout.paths_for(5), start).await.unwrap_err();
        assert!(matches!(err, StreamError::Internal(_)));
    }

    #[tokio::test]
    async fn test_teardown_cancels() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        registry
            .get_or_start(6, layout.paths_for(6), producing(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap();
        let session = registry.get(6).unwrap();

        assert!(registry.teardown(6));
        assert!(session.is_cancelled());
        assert!(registry.get(6).is_none());
        assert!(!registry.teardown(6));
    }

    #[tokio::test]
    async fn test_teardown_while_starting_fails_waiters() {
        let (_dir, layout) = layout();
        let registry = Arc::new(SessionRegistry::new());
        let start = |session: Arc<Session>| async move {
            session.cancel_token().cancelled().await;
            Err::<(), _>(StreamError::SessionCancelled(session.asset_id()))
        };
        let waiter = {
            let registry = registry.clone();
            let paths = layout.paths_for(7);
            tokio::spawn(async move { registry.get_or_start(7, paths, start).await })
        };
        while registry.get(7).is_none() {
            tokio::task::yield_now().await;
        }
        registry.teardown(7);
        assert!(matches!(
            waiter.await.unwrap(),
            Err(StreamError::SessionCancelled(7))
        ));
    }

    #[tokio::test]
    async fn test_evict_idle_and_shutdown() {
        let (_dir, layout) = layout();
        let registry = SessionRegistry::new();
        for id in [10, 11] {
            registry
                .get_or_start(id, layout.paths_for(id), producing(Arc::new(AtomicUsize::new(0))))
                .await
                .unwrap();
        }

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.get(11).unwrap().touch();
        assert_eq!(registry.evict_idle(Duration::from_millis(10)), 1);
        assert!(registry.get(10).is_none());

        let last = registry.get(11).unwrap();
        assert_eq!(registry.shutdown(), 1);
        assert!(last.is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let registry = Arc::new(SessionRegistry::new());
        let shutdown = CancellationToken::new();
        let sweeper = spawn_idle_sweeper(
            registry,
            Duration::from_secs(1),
            Duration::from_millis(5),
            shutdown.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[test]
    fn test_handle_outcome_is_reported_in_summary() {
        let session = Session::new(1, 1, OutputLayout::new("/tmp", "/hls").paths_for(1));
        let (reporter, handle) = EncodeHandle::new(Some(3));
        session.attach_encoder(handle);
        reporter.report(EncodeOutcome::Success);
        let summary = session.summary();
        assert!(!summary.encoding);
        assert_eq!(summary.encoder_pid, Some(3));
    }
}
