//! Local adapters for single-host deployment.

pub mod catalog;
pub mod ffmpeg;
pub mod http;

pub use catalog::{InMemoryCatalog, SqliteCatalog};
pub use ffmpeg::FfmpegSupervisor;
