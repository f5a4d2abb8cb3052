//! # Transport Capability
//!
//! The duplex text-socket primitive the feed depends on. The feed never talks
//! to a socket library directly: it holds an `Arc<dyn Transport>` and opens
//! [`Connection`]s through it, so tests can substitute a scripted transport
//! and hosts without socket support can report themselves as unsupported.
//!
//! ## Contained Modules:
//! - **`wss`**: the tokio-tungstenite implementation used against the live
//!   service (feature `wss`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use async_trait::async_trait;

/// The tokio-tungstenite WebSocket transport.
#[cfg(feature = "wss")]
pub mod wss;

#[cfg(feature = "wss")]
pub use wss::WsTransport;

/// Failures raised by a transport or one of its connections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The host cannot create this kind of transport at all.
    #[error("transport is not supported on this host")]
    Unsupported,
    /// Opening a connection to the endpoint failed.
    #[error("failed to open {uri}: {reason}")]
    Open {
        /// Endpoint that was being opened.
        uri: String,
        /// Underlying failure.
        reason: String,
    },
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Reading from the connection failed.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Factory for live connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Whether the host can create connections at all. When this returns
    /// `false` the feed degrades without attempting any endpoint.
    fn is_supported(&self) -> bool {
        true
    }

    /// Opens a connection to `uri`, resolving once it is ready for traffic.
    async fn open(&self, uri: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open duplex connection exchanging text frames.
#[async_trait]
pub trait Connection: Send {
    /// Sends one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Waits for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: the feed polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Closes the connection. Errors are ignored; the connection is gone either way.
    async fn close(&mut self);
}
