//! # Data Ingestors Module
//!
//! Clients that bring external data into the process. Each submodule owns the
//! connection lifecycle for one source and exposes a handle the rest of the
//! application subscribes through.
//!
//! ## Contained Modules:
//! - **`blockchain_wss`**: the resilient blockchain.info WebSocket feed of new
//!   blocks and unconfirmed transactions, with endpoint failover, heartbeat,
//!   bounded reconnection and a degraded-mode flag.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The blockchain.info live feed.
pub mod blockchain_wss;

// --- Public API Re-exports ---
pub use blockchain_wss::{BlockchainFeed, ConnectOutcome, DegradedReason, FeedEvent};
