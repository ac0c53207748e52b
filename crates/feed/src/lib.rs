//! # Live Tick Feed
//!
//! Subscribes to the exchange's aggregate-trade WebSocket streams and
//! fans each symbol out on its own lossy broadcast channel. The adapter
//! owns reconnection; consumers just see a channel of `Tick`s whose
//! timestamps are non-decreasing per symbol (modulo exchange reorderings,
//! which the engine drops). A tick may be replayed across a reconnect
//! boundary; the engine deduplicates.
//!
//! Market data only: no authentication, no order flow.

pub mod connector;
pub mod error;

pub use connector::TickFeed;
pub use error::FeedError;
