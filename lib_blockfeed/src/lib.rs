//! # lib_blockfeed
//!
//! A resilient live feed of new Bitcoin blocks and unconfirmed transactions
//! from the blockchain.info WebSocket service.
//!
//! The feed keeps one connection alive across a prioritized list of
//! endpoints, replays the caller's subscriptions on every (re)open, pings on
//! a fixed period, reconnects with bounded linear backoff, and, when no live
//! connection can be sustained, flips a degraded flag the caller uses to
//! switch to its own synthetic data. None of its public operations fail.
//!
//! ```ignore
//! use std::sync::Arc;
//! use lib_blockfeed::{BlockchainFeed, EventTag, FeedSettings, WsTransport};
//!
//! let feed = BlockchainFeed::spawn(FeedSettings::default(), Arc::new(WsTransport::new()))?;
//! feed.on_message(EventTag::Block, |msg| println!("block {}", msg.payload["height"]));
//! feed.subscribe_new_blocks();
//! if feed.connect().await.is_degraded() {
//!     // render synthetic data
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Feed settings.
pub mod configs;
/// Connector, registry, heartbeat, supervisor and dispatcher.
pub mod core;
/// Errors reported to the error observer.
pub mod error;
/// The feed service.
pub mod ingestors;
/// Wire frames.
pub mod protocol;
/// The duplex socket capability.
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export everything a caller needs.
pub use configs::{FeedSettings, SettingsError};
pub use core::{EndpointError, EndpointList, FeedState, ReconnectPolicy};
pub use error::FeedError;
pub use ingestors::{BlockchainFeed, ConnectOutcome, DegradedReason, FeedEvent};
pub use protocol::{EventTag, FeedMessage, Subscription, SubscriptionKind};
pub use transport::{Connection, Transport, TransportError};

#[cfg(feature = "wss")]
pub use transport::WsTransport;
