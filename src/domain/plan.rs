//! Encoder argument planning.
//!
//! Pure: the same asset, options and output paths always give the same plan.
//! Hardware and downscale choices are injected through [`EncodePlanner`], the
//! environment is never consulted here.

use super::asset::Asset;
use super::layout::OutputPaths;
use serde::Serialize;
use std::fmt;

/// Codecs every HLS player accepts as-is.
pub const BASELINE_VIDEO_CODEC: &str = "h264";
pub const BASELINE_AUDIO_CODEC: &str = "aac";

/// Sources wider than this are scaled down on the GPU path.
const DOWNSCALE_WIDTH_THRESHOLD: u32 = 1920;
const DEFAULT_DOWNSCALE_HEIGHT: u32 = 1080;

const HLS_SEGMENT_SECONDS: u32 = 2;
/// 2 s at 24 fps
const GOP_SIZE: &str = "48";

const MP4_FAMILY: [&str; 3] = ["mp4", "mov", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    #[default]
    Software,
    Gpu,
}

impl HardwareBackend {
    /// Accepts the values operators put in `GPU=`.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "nvenc" | "cuda" | "gpu" => HardwareBackend::Gpu,
            _ => HardwareBackend::Software,
        }
    }
}

impl fmt::Display for HardwareBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareBackend::Software => write!(f, "software"),
            HardwareBackend::Gpu => write!(f, "gpu"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodePlan {
    pub args: Vec<String>,
    pub remux_only: bool,
    pub backend: HardwareBackend,
}

impl EncodePlan {
    pub fn has_arg_pair(&self, flag: &str, value: &str) -> bool {
        self.args
            .windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodePlanner {
    pub backend: HardwareBackend,
    /// Target output height, when set
    pub downscale: Option<u32>,
}

impl EncodePlanner {
    pub fn new(backend: HardwareBackend, downscale: Option<u32>) -> Self {
        Self { backend, downscale }
    }

    pub fn plan(&self, asset: &Asset, paths: &OutputPaths) -> EncodePlan {
        build_plan(asset, self.backend, self.downscale, paths)
    }
}

pub fn is_remux_compatible(asset: &Asset) -> bool {
    asset.video_codec.eq_ignore_ascii_case(BASELINE_VIDEO_CODEC)
        && asset.audio_codec.eq_ignore_ascii_case(BASELINE_AUDIO_CODEC)
}

pub fn build_plan(
    asset: &Asset,
    backend: HardwareBackend,
    downscale: Option<u32>,
    paths: &OutputPaths,
) -> EncodePlan {
    let remux_only = is_remux_compatible(asset);
    let gpu = !remux_only && backend == HardwareBackend::Gpu;
    let mut args = Args::default();

    // Hardware decode has to be requested before the input.
    if gpu {
        args.push(["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
    }

    args.push(["-i"]);
    args.push_one(asset.path.to_string_lossy());

    // First video, optional first audio, no subtitles.
    args.push(["-map", "0:v:0", "-map", "0:a:0?", "-sn"]);

    if remux_only {
        args.push(["-c:v", "copy", "-c:a", "copy"]);
        if MP4_FAMILY.contains(&asset.container().as_str()) {
            args.push(["-bsf:v", "h264_mp4toannexb"]);
        }
    } else {
        if gpu {
            args.push([
                "-c:v", "h264_nvenc", "-preset", "p1", "-tune", "ll", "-rc", "vbr", "-cq", "21",
                "-b:v", "8M", "-maxrate", "10M", "-bufsize", "16M",
            ]);
        } else {
            args.push(["-c:v", "libx264", "-preset", "ultrafast", "-crf", "23"]);
        }

        args.push(["-g", GOP_SIZE, "-keyint_min", GOP_SIZE, "-sc_threshold", "0"]);
        args.push(["-force_key_frames"]);
        args.push_one(format!("expr:gte(t,n_forced*{})", HLS_SEGMENT_SECONDS));

        if gpu {
            args.push(["-bf", "0", "-profile:v", "high", "-level", "4.1", "-vf"]);
            args.push_one(gpu_filter(asset, downscale));
        } else {
            args.push(["-pix_fmt", "yuv420p", "-profile:v", "high", "-level", "4.1"]);
        }

        args.push(["-c:a", "aac", "-b:a", "160k", "-ac", "2"]);
    }

    args.push(["-f", "hls", "-hls_time"]);
    args.push_one(HLS_SEGMENT_SECONDS.to_string());
    args.push([
        "-hls_list_size",
        "0",
        "-hls_flags",
        "append_list+independent_segments",
        "-hls_playlist_type",
        "event",
        "-hls_segment_filename",
    ]);
    args.push_one(paths.segment_template().to_string_lossy());
    args.push_one(paths.playlist.to_string_lossy());

    EncodePlan {
        args: args.0,
        remux_only,
        backend: if gpu {
            HardwareBackend::Gpu
        } else {
            HardwareBackend::Software
        },
    }
}

/// Scales and converts to 8-bit NV12 inside the CUDA pipeline.
fn gpu_filter(asset: &Asset, downscale: Option<u32>) -> String {
    let height = match downscale {
        Some(h) => Some(h),
        None if asset.width > DOWNSCALE_WIDTH_THRESHOLD => Some(DEFAULT_DOWNSCALE_HEIGHT),
        None => None,
    };
    match height {
        Some(h) => format!("scale_cuda=-2:{}:format=nv12", h),
        None => "scale_cuda=format=nv12".to_string(),
    }
}

#[derive(Default)]
struct Args(Vec<String>);

impl Args {
    fn push<const N: usize>(&mut self, items: [&str; N]) {
        self.0.extend(items.iter().map(|s| s.to_string()));
    }

    fn push_one(&mut self, item: impl Into<String>) {
        self.0.push(item.into());
    }
}
