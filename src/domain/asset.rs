use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type AssetId = u64;

/// A catalogued video file. Owned by the catalog, read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub path: PathBuf,
    pub title: String,
    /// Seconds
    pub duration: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub width: u32,
    pub height: u32,
}

impl Asset {
    /// Lowercased file extension of the source, without the dot.
    pub fn container(&self) -> String {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn title_from_path(path: &Path) -> String {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn sample(id: AssetId, path: &str, video: &str, audio: &str, width: u32) -> Asset {
    Asset {
        id,
        path: PathBuf::from(path),
        title: Asset::title_from_path(Path::new(path)),
        duration: 120.0,
        video_codec: video.to_string(),
        audio_codec: audio.to_string(),
        width,
        height: width * 9 / 16,
    }
}
