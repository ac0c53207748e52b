//! # Execution Gateway
//!
//! This crate provides the order-submission seam between the engine and
//! the venue. It defines a generic `ExecutionGateway` trait and provides a
//! `PaperGateway` used for paper trading and deterministic replay.
//!
//! ## Architectural Principles
//!
//! - **The gateway knows nothing about positions, P&L, or stops.** It
//!   accepts an order intent and returns a fill (or a typed failure); the
//!   ledger owns all accounting.
//! - **Fills are priced by the gateway.** In paper mode the fill is the
//!   contemporaneous tick recorded by the engine's dispatch path; the
//!   slippage cost itself is folded into gross P&L on close so it is
//!   charged exactly once.
//! - **Retries live outside the trait.** `with_retry` wraps any gateway
//!   call with exponential backoff under the per-order deadline.

pub mod error;
pub mod gateway;
pub mod paper;
pub mod retry;

pub use error::OrderError;
pub use gateway::{ExecutionGateway, MarketObserver};
pub use paper::PaperGateway;
pub use retry::{with_retry, RetryPolicy};
