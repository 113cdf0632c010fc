//! Bounded wait for the first playable output of an encoder.

use crate::domain::layout::OutputPaths;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl ReadinessPolicy {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    /// Upper bound of a full wait.
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        // ~12s
        Self::new(Duration::from_millis(150), 80)
    }
}

/// True once the playlist and at least one segment exist in `dir`.
pub async fn is_ready(playlist: &Path, dir: &Path) -> bool {
    if !tokio::fs::try_exists(playlist).await.unwrap_or(false) {
        return false;
    }
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if OutputPaths::is_segment_name(&entry.file_name().to_string_lossy()) {
            return true;
        }
    }
    false
}

/// Polls until the output is playable or the attempt budget is spent.
///
/// Never takes longer than `poll_interval * max_attempts` plus the time of the
/// filesystem checks themselves. Running out of attempts is not an error, the
/// caller decides what a timeout means.
pub async fn wait_until_ready(paths: &OutputPaths, policy: ReadinessPolicy) -> bool {
    for attempt in 0..policy.max_attempts {
        if is_ready(&paths.playlist, &paths.dir).await {
            tracing::debug!(dir = ?paths.dir, attempt, "output ready");
            return true;
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layout::OutputLayout;
    use std::time::Instant;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_needs_playlist_and_segment() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(1);
        std::fs::create_dir_all(&paths.dir).unwrap();

        assert!(!is_ready(&paths.playlist, &paths.dir).await);
        std::fs::write(&paths.playlist, "#EXTM3U\n").unwrap();
        assert!(!is_ready(&paths.playlist, &paths.dir).await);
        std::fs::write(paths.dir.join("seg_00000.tmp"), b"x").unwrap();
        assert!(!is_ready(&paths.playlist, &paths.dir).await);
        std::fs::write(paths.dir.join("seg_00000.ts"), b"x").unwrap();
        assert!(is_ready(&paths.playlist, &paths.dir).await);
    }

    #[tokio::test]
    async fn test_segment_without_playlist() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(1);
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(paths.dir.join("seg_00000.ts"), b"x").unwrap();
        assert!(!is_ready(&paths.playlist, &paths.dir).await);
    }

    #[tokio::test]
    async fn test_wait_is_bounded() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(1);
        let policy = ReadinessPolicy::new(Duration::from_millis(20), 5);

        let started = Instant::now();
        assert!(!wait_until_ready(&paths, policy).await);
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(80), "{:?}", elapsed);
        assert!(elapsed < policy.budget() + Duration::from_millis(500), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_zero_attempts_returns_immediately() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(1);
        let policy = ReadinessPolicy::new(Duration::from_secs(5), 0);
        let started = Instant::now();
        assert!(!wait_until_ready(&paths, policy).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_sees_late_output() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(1);
        std::fs::create_dir_all(&paths.dir).unwrap();

        let writer = {
            let paths = paths.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                tokio::fs::write(paths.dir.join("seg_00000.ts"), b"x").await.unwrap();
                tokio::fs::write(&paths.playlist, "#EXTM3U\n").await.unwrap();
            })
        };

        let policy = ReadinessPolicy::new(Duration::from_millis(20), 100);
        assert!(wait_until_ready(&paths, policy).await);
        writer.await.unwrap();
    }
}
