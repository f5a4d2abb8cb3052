//! # Core Engine Module
//!
//! The building blocks the feed reactor is assembled from. Each one is plain,
//! synchronous state with no I/O of its own; the reactor in
//! `ingestors::blockchain_wss` drives them from transport and timer events.
//!
//! ## Core Components:
//!
//! - **`connector`**: the immutable, ordered endpoint list and the cursor that
//!   walks it one endpoint at a time.
//!
//! - **`registry`**: the set of logical subscriptions, replayed in full on
//!   every successful open.
//!
//! - **`heartbeat`**: the wall-clock ping timer for an open connection.
//!
//! - **`supervisor`**: bounded, linearly backed-off reconnection and the
//!   `FeedState` reported to callers.
//!
//! - **`dispatcher`**: parses inbound frames and fans them out to the
//!   callbacks registered for their tag, isolating each callback.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Endpoint list and failover cursor.
pub mod connector;
/// Tag-routed callback fan-out.
pub mod dispatcher;
/// Liveness probing for open connections.
pub mod heartbeat;
/// The set of subscriptions to keep active.
pub mod registry;
/// Reconnection policy and feed state.
pub mod supervisor;

// --- Public API Re-exports ---
pub use connector::{EndpointError, EndpointList, FailoverCursor};
pub use dispatcher::{Dispatcher, ErrorCallback, MessageCallback};
pub use heartbeat::Heartbeat;
pub use registry::Registry;
pub use supervisor::{FeedState, ReconnectPolicy, Supervisor};
