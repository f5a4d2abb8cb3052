//! Errors surfaced to the feed's error observer.

use thiserror::Error;

/// A failure the feed recovered from (or degraded on), reported best-effort
/// to the observer registered with `BlockchainFeed::on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// An endpoint refused or failed while opening.
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectFailed {
        /// Endpoint being opened.
        endpoint: String,
        /// Transport message.
        reason: String,
    },
    /// An open connection failed or was closed by the remote side.
    #[error("connection to {endpoint} lost{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionLost {
        /// Endpoint of the lost connection.
        endpoint: String,
        /// Transport message, `None` for a clean remote close.
        reason: Option<String>,
    },
    /// A liveness ping could not be sent.
    #[error("heartbeat to {endpoint} failed: {reason}")]
    HeartbeatFailed {
        /// Endpoint of the probed connection.
        endpoint: String,
        /// Transport message.
        reason: String,
    },
}
