//! Marquee - On-demand HLS streaming sessions
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (assets, probe reports, output layout, encode plans, sessions)
//! - ports/: Trait definitions (asset catalog, encoder launcher)
//! - adapters/: Concrete implementations (SQLite catalog, ffmpeg, HTTP)
//! - application/: Generic services (readiness, session registry, stream service)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::stream::{StreamService, StreamSettings, TimeoutPolicy};
pub use config::StreamConfig;
pub use error::StreamError;
