//! # Engine Events
//!
//! Structured events broadcast by the engine while it runs. Consumers
//! subscribe to a `tokio::sync::broadcast` channel of these; the binary
//! relays them to the log, and external observers can attach without
//! touching engine internals.
//!
//! As a Layer 0 crate, this depends only on `core-types`.

pub mod error;
pub mod messages;

pub use error::EventsError;
pub use messages::EngineEvent;
