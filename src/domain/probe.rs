//! Probe tool report, as printed by `ffprobe -print_format json -show_format -show_streams`.

use super::asset::{Asset, AssetId};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct ProbeReport {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeFormat {
    /// Decimal seconds, printed as a string by the probe tool
    pub duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ProbeReport {
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    pub fn duration(&self) -> f64 {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn first_video(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    /// First audio stream that actually names a codec.
    pub fn first_audio(&self) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type == "audio" && !s.codec_name.is_empty())
    }

    pub fn into_asset(self, id: AssetId, path: &Path) -> Asset {
        let (video_codec, width, height) = match self.first_video() {
            Some(v) => (
                v.codec_name.clone(),
                v.width.unwrap_or(0),
                v.height.unwrap_or(0),
            ),
            None => (String::new(), 0, 0),
        };
        let audio_codec = self
            .first_audio()
            .map(|a| a.codec_name.clone())
            .unwrap_or_default();

        Asset {
            id,
            path: path.to_path_buf(),
            title: Asset::title_from_path(path),
            duration: self.duration(),
            video_codec,
            audio_codec,
            width,
            height,
        }
    }
}
