//! # Feed Settings
//!
//! Tunables for a `BlockchainFeed`. Durations are stored in milliseconds so
//! the struct round-trips through the same camelCase JSON the server's config
//! file uses. Every field has a default, so a partial file is valid.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::connector::{EndpointError, EndpointList};
use crate::core::supervisor::ReconnectPolicy;

/// The public blockchain.info feed.
pub const DEFAULT_ENDPOINT: &str = "wss://ws.blockchain.info/inv";

/// Errors raised while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for `FeedSettings`.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An endpoint is unusable.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// # Feed Settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedSettings {
    /// Endpoints in priority order.
    pub endpoints: Vec<String>,
    /// Only keep `wss://` endpoints.
    pub secure_only: bool,
    /// How long one endpoint may take to open before the next is tried.
    pub open_timeout_ms: u64,
    /// Period of the liveness ping.
    pub heartbeat_interval_ms: u64,
    /// Reconnection attempt `k` waits `k` times this long.
    pub reconnect_base_delay_ms: u64,
    /// Reconnection attempts before the feed degrades.
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            secure_only: false,
            open_timeout_ms: 5000,
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 2000,
            max_reconnect_attempts: 5,
        }
    }
}

impl FeedSettings {
    /// Default settings pointed at `endpoints`.
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Validates and filters the endpoint list.
    pub fn endpoint_list(&self) -> Result<EndpointList, EndpointError> {
        EndpointList::new(&self.endpoints, self.secure_only)
    }

    /// Per-endpoint open timeout.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reconnection policy derived from these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Loads settings from a JSON file, filling missing fields with defaults,
    /// and checks that the endpoints are usable.
    #[cfg(feature = "configs")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings: FeedSettings = serde_json::from_str(&text)?;
        settings.endpoint_list()?;
        log::debug!("Loaded feed settings from {}", path.as_ref().display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_public_feed() {
        let settings = FeedSettings::default();
        assert_eq!(settings.endpoints, vec![DEFAULT_ENDPOINT]);
        assert_eq!(settings.open_timeout(), Duration::from_secs(5));
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.reconnect_policy(), ReconnectPolicy { base_delay: Duration::from_secs(2), max_attempts: 5 });
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: FeedSettings =
            serde_json::from_str(r#"{"endpoints":["wss://a.example/inv"],"maxReconnectAttempts":3}"#).unwrap();
        assert_eq!(settings.endpoints, vec!["wss://a.example/inv"]);
        assert_eq!(settings.max_reconnect_attempts, 3);
        assert_eq!(settings.open_timeout_ms, 5000);
    }

    #[test]
    fn endpoint_list_applies_secure_filter() {
        let mut settings = FeedSettings::with_endpoints(["ws://a.example", "wss://b.example"]);
        settings.secure_only = true;
        assert_eq!(settings.endpoint_list().unwrap().iter().collect::<Vec<_>>(), vec!["wss://b.example"]);
    }

    #[cfg(feature = "configs")]
    #[test]
    fn loads_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoints":["wss://a.example/inv"],"heartbeatIntervalMs":1000}}"#).unwrap();
        let settings = FeedSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(1));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"endpoints":["https://a.example"]}}"#).unwrap();
        assert!(matches!(FeedSettings::from_json_file(bad.path()), Err(SettingsError::Endpoint(_))));
    }
}
