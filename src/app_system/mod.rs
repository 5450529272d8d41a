//! System orchestration, startup, and shutdown logic.

pub mod settings;
pub mod storefront_system;
pub mod telemetry;

pub use settings::*;
pub use storefront_system::*;
pub use telemetry::*;
