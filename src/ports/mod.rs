//! Ports - traits the application layer depends on.

pub mod catalog;
pub mod encoder;
