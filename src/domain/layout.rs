//! On-disk layout of a session's output.
//!
//! ```text
//! <base>/<asset id>/master.m3u8
//! <base>/<asset id>/seg_00000.ts
//! <base>/<asset id>/seg_00001.ts
//! ```

use super::asset::AssetId;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const PLAYLIST_NAME: &str = "master.m3u8";
const SEGMENT_PREFIX: &str = "seg_";
const SEGMENT_DIGITS: usize = 5;
const SEGMENT_EXT: &str = "ts";

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\d{{{}}}\.{}$",
            SEGMENT_PREFIX, SEGMENT_DIGITS, SEGMENT_EXT
        ))
        .expect("segment pattern is a valid regex")
    })
}

/// Maps asset ids to output directories and public URLs.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base_dir: PathBuf,
    url_prefix: String,
}

impl OutputLayout {
    pub fn new(base_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let url_prefix = url_prefix.into();
        Self {
            base_dir: base_dir.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The URL prefix when it is a path on this server, like `/hls`.
    /// `None` for absolute URLs pointing at another host.
    pub fn local_route(&self) -> Option<&str> {
        let prefix = self.url_prefix.as_str();
        (prefix.len() > 1 && prefix.starts_with('/') && !prefix.starts_with("//")).then_some(prefix)
    }

    pub fn paths_for(&self, asset_id: AssetId) -> OutputPaths {
        let dir = self.base_dir.join(asset_id.to_string());
        OutputPaths {
            playlist: dir.join(PLAYLIST_NAME),
            playlist_url: format!("{}/{}/{}", self.url_prefix, asset_id, PLAYLIST_NAME),
            dir,
        }
    }
}

/// Where one session writes and how clients reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub playlist: PathBuf,
    pub playlist_url: String,
}

impl OutputPaths {
    /// Filename template handed to the encoder, e.g. `<dir>/seg_%05d.ts`.
    pub fn segment_template(&self) -> PathBuf {
        self.dir.join(format!(
            "{}%0{}d.{}",
            SEGMENT_PREFIX, SEGMENT_DIGITS, SEGMENT_EXT
        ))
    }

    pub fn is_segment_name(name: &str) -> bool {
        segment_regex().is_match(name)
    }

    /// Removes a previous playlist and its segments. Missing files are fine.
    pub async fn clear_stale(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == PLAYLIST_NAME || Self::is_segment_name(&name) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_for_asset() {
        let layout = OutputLayout::new("/var/hls", "/hls/");
        let paths = layout.paths_for(42);
        assert_eq!(paths.dir, PathBuf::from("/var/hls/42"));
        assert_eq!(paths.playlist, PathBuf::from("/var/hls/42/master.m3u8"));
        assert_eq!(paths.playlist_url, "/hls/42/master.m3u8");
        assert_eq!(
            paths.segment_template(),
            PathBuf::from("/var/hls/42/seg_%05d.ts")
        );
    }

    #[test]
    fn test_local_route() {
        assert_eq!(OutputLayout::new("/srv", "/media/").local_route(), Some("/media"));
        assert_eq!(OutputLayout::new("/srv", "https://cdn.example/hls").local_route(), None);
        assert_eq!(OutputLayout::new("/srv", "//cdn.example/hls").local_route(), None);
        assert_eq!(OutputLayout::new("/srv", "/").local_route(), None);
    }

    #[test]
    fn test_segment_names() {
        assert!(OutputPaths::is_segment_name("seg_00001.ts"));
        assert!(OutputPaths::is_segment_name("seg_12345.ts"));
        assert!(!OutputPaths::is_segment_name("seg_1.ts"));
        assert!(!OutputPaths::is_segment_name("seg_00001.ts.tmp"));
        assert!(!OutputPaths::is_segment_name("master.m3u8"));
    }

    #[tokio::test]
    async fn test_clear_stale_keeps_other_files() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path(), "/hls").paths_for(3);
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.playlist, "#EXTM3U\n").unwrap();
        std::fs::write(paths.dir.join("seg_00000.ts"), b"x").unwrap();
        std::fs::write(paths.dir.join("seg_00001.ts"), b"x").unwrap();
        std::fs::write(paths.dir.join("poster.webp"), b"x").unwrap();

        assert_eq!(paths.clear_stale().await.unwrap(), 3);
        assert!(!paths.playlist.exists());
        assert!(paths.dir.join("poster.webp").exists());
    }

    #[tokio::test]
    async fn test_clear_stale_missing_dir() {
        let dir = tempdir().unwrap();
        let paths = OutputLayout::new(dir.path().join("nothing"), "/hls").paths_for(3);
        assert_eq!(paths.clear_stale().await.unwrap(), 0);
    }
}
