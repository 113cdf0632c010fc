//! Error type shared by the session orchestrator.

use crate::domain::asset::AssetId;
use crate::ports::encoder::EncodeOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Every failure a streaming request can end in.
///
/// The type is `Clone` because a single start attempt is awaited by every
/// concurrent caller of the same asset, and each of them gets the outcome.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("could not create output directory {path:?}: {source}")]
    OutputDirCreateFailed {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("could not start {program}: {source}")]
    EncodeProcessSpawnFailed {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("encoder exited before producing output ({outcome})")]
    EncodeExited { outcome: EncodeOutcome },

    #[error("no playable output for asset {asset_id} after {waited:?}")]
    ReadinessTimeout { asset_id: AssetId, waited: Duration },

    #[error("session for asset {0} was cancelled")]
    SessionCancelled(AssetId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StreamError {
    pub fn output_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StreamError::OutputDirCreateFailed {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::EncodeProcessSpawnFailed {
            program: program.into(),
            source: Arc::new(source),
        }
    }

    /// Short machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::AssetNotFound(_) => "not_found",
            StreamError::Catalog(_) => "catalog_error",
            StreamError::OutputDirCreateFailed { .. } => "output_dir_error",
            StreamError::EncodeProcessSpawnFailed { .. } => "spawn_error",
            StreamError::EncodeExited { .. } => "encoder_exited",
            StreamError::ReadinessTimeout { .. } => "readiness_timeout",
            StreamError::SessionCancelled(_) => "cancelled",
            StreamError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_spawn_error_keeps_source() {
        let err = StreamError::spawn("ffmpeg", io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(err.code(), "spawn_error");
        assert!(err.to_string().contains("ffmpeg"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_clone_shares_io_source() {
        let err = StreamError::output_dir("/nope", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert_eq!(copy.code(), "output_dir_error");
    }
}
