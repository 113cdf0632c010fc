//! Domain layer - Pure business logic.

pub mod asset;
pub mod layout;
pub mod plan;
pub mod probe;
pub mod session;
