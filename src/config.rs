//! Configuration for single-host deployment.

use crate::application::readiness::ReadinessPolicy;
use crate::application::stream::{StreamSettings, TimeoutPolicy};
use crate::domain::layout::OutputLayout;
use crate::domain::plan::{EncodePlanner, HardwareBackend};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// HTTP server bind address
    pub bind: String,
    /// Base directory for HLS output
    pub hls_dir: PathBuf,
    /// SQLite catalog file
    pub catalog_db: PathBuf,
    /// Encoder executable
    pub ffmpeg_bin: String,
    pub backend: HardwareBackend,
    /// Target output height
    pub downscale: Option<u32>,
    pub ready_poll: Duration,
    pub ready_max_attempts: u32,
    pub timeout_policy: TimeoutPolicy,
    /// Zero disables idle eviction
    pub session_idle: Duration,
    /// URL prefix of handed out playlist URLs
    pub public_hls_prefix: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let readiness = ReadinessPolicy::default();
        Self {
            bind: String::from("127.0.0.1:8080"),
            hls_dir: PathBuf::from("./hls"),
            catalog_db: PathBuf::from("catalog.db"),
            ffmpeg_bin: String::from("ffmpeg"),
            backend: HardwareBackend::Software,
            downscale: None,
            ready_poll: readiness.poll_interval,
            ready_max_attempts: readiness.max_attempts,
            timeout_policy: TimeoutPolicy::Fail,
            session_idle: Duration::ZERO,
            public_hls_prefix: String::from("/hls"),
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys keep their
    /// default; unparsable ones too, with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_policy = match var("READY_TIMEOUT_POLICY") {
            Some(raw) => TimeoutPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(key = "READY_TIMEOUT_POLICY", value = %raw, "Unknown value, using default");
                defaults.timeout_policy
            }),
            None => defaults.timeout_policy,
        };

        Self {
            bind: var("BIND").unwrap_or(defaults.bind),
            hls_dir: var("HLS_DIR").map(PathBuf::from).unwrap_or(defaults.hls_dir),
            catalog_db: var("CATALOG_DB").map(PathBuf::from).unwrap_or(defaults.catalog_db),
            ffmpeg_bin: var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            backend: var("GPU")
                .map(|hint| HardwareBackend::from_hint(&hint))
                .unwrap_or(defaults.backend),
            downscale: parsed::<u32>("DOWNSCALE", var("DOWNSCALE")).filter(|h| *h > 0),
            ready_poll: parsed::<u64>("READY_POLL_MS", var("READY_POLL_MS"))
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_poll),
            ready_max_attempts: parsed::<u32>("READY_MAX_ATTEMPTS", var("READY_MAX_ATTEMPTS"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.ready_max_attempts),
            timeout_policy,
            session_idle: parsed::<u64>("SESSION_IDLE_SECS", var("SESSION_IDLE_SECS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle),
            public_hls_prefix: var("PUBLIC_HLS_PREFIX").unwrap_or(defaults.public_hls_prefix),
        }
    }

    pub fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(self.ready_poll, self.ready_max_attempts)
    }

    pub fn idle_eviction(&self) -> Option<Duration> {
        (!self.session_idle.is_zero()).then_some(self.session_idle)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            layout: OutputLayout::new(&self.hls_dir, &self.public_hls_prefix),
            planner: EncodePlanner::new(self.backend, self.downscale),
            readiness: self.readiness(),
            timeout_policy: self.timeout_policy,
        }
    }
}

fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid number, using default");
            None
        }
    }
}
