//! # Endpoint Failover Connector
//!
//! The ordered list of remote endpoints and the cursor that walks it.
//!
//! Endpoints are tried strictly left to right, one at a time: the reactor
//! asks the cursor for the current endpoint, opens it under a timeout, and
//! advances on timeout or error. When the cursor runs off the end the sweep
//! is exhausted and the caller decides what that means (degrade, or count a
//! failed reconnection attempt).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;

use url::Url;

/// Why an endpoint URI was rejected while building the list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// The URI does not parse.
    #[error("invalid endpoint '{uri}': {reason}")]
    Invalid {
        /// The rejected URI.
        uri: String,
        /// Parser message.
        reason: String,
    },
    /// The scheme is neither `ws` nor `wss`.
    #[error("endpoint '{0}' is not a ws:// or wss:// URI")]
    UnsupportedScheme(String),
}

/// An immutable, ordered list of WebSocket endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointList {
    endpoints: Arc<[String]>,
}

impl EndpointList {
    /// Builds the list, validating every URI.
    ///
    /// With `secure_only` set, plain `ws://` endpoints are filtered out, the
    /// way a page served over https may only open `wss://` sockets.
    pub fn new<I, S>(uris: I, secure_only: bool) -> Result<Self, EndpointError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut endpoints = Vec::new();
        for uri in uris {
            let uri = uri.as_ref().trim();
            let parsed = Url::parse(uri).map_err(|e| EndpointError::Invalid {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

            match parsed.scheme() {
                "wss" => endpoints.push(uri.to_string()),
                "ws" if secure_only => {
                    log::info!("Skipping insecure endpoint {} (secure only)", uri);
                }
                "ws" => endpoints.push(uri.to_string()),
                _ => return Err(EndpointError::UnsupportedScheme(uri.to_string())),
            }
        }

        Ok(Self { endpoints: endpoints.into() })
    }

    /// The endpoint at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.endpoints.get(index).map(String::as_str)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint survived filtering.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterates the endpoints in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(String::as_str)
    }
}

/// Position of the current sweep within an [`EndpointList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailoverCursor {
    index: usize,
}

impl FailoverCursor {
    /// Starts a sweep at the highest-priority endpoint.
    pub fn start() -> Self {
        Self::default()
    }

    /// Index of the endpoint to try next.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The endpoint to try next, or `None` once the list is exhausted.
    pub fn current<'a>(&self, endpoints: &'a EndpointList) -> Option<&'a str> {
        endpoints.get(self.index)
    }

    /// Moves past the current endpoint after a timeout or error.
    pub fn advance(&mut self) {
        self.index += 1;
    }
}
