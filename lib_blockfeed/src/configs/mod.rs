//! # Configuration Modules
//!
//! Settings that shape the feed: which endpoints to try, how long to wait
//! for each, how often to probe, and how hard to retry.

/// Feed settings with defaults and optional JSON file loading.
pub mod feed_settings;

pub use feed_settings::{FeedSettings, SettingsError};
