//! Read-only HTTP API

pub mod consensus;
pub mod events;
pub mod health;
pub mod sources;

pub use consensus::consensus_routes;
pub use events::event_routes;
pub use health::health_routes;
pub use sources::source_routes;
