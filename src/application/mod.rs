//! Application layer - Generic services that use ports.

pub mod readiness;
pub mod registry;
pub mod stream;
