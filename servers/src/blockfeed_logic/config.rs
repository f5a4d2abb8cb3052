use clap::Parser;
use lib_blockfeed::FeedSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Live Bitcoin block and mempool feed", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "BLOCKFEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "BLOCKFEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "BLOCKFEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long = "endpoint", env = "BLOCKFEED_ENDPOINTS", value_delimiter = ',', help = "Feed endpoints in priority order (repeat or comma-separate).")]
    pub endpoints: Option<Vec<String>>,

    #[clap(long, env = "BLOCKFEED_SECURE_ONLY", help = "Drop plain ws:// endpoints.")]
    pub secure_only: Option<bool>,

    #[clap(long, env = "BLOCKFEED_OPEN_TIMEOUT_MS", help = "Milliseconds one endpoint may take to open.")]
    pub open_timeout_ms: Option<u64>,

    #[clap(long, env = "BLOCKFEED_HEARTBEAT_INTERVAL_MS", help = "Milliseconds between liveness pings.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "BLOCKFEED_RECONNECT_BASE_DELAY_MS", help = "Reconnect attempt k waits k times this many milliseconds.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "BLOCKFEED_MAX_RECONNECT_ATTEMPTS", help = "Reconnect attempts before falling back to synthetic data.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "BLOCKFEED_BLOCKS", help = "Subscribe to new blocks.")]
    pub blocks: Option<bool>,

    #[clap(long, env = "BLOCKFEED_TRANSACTIONS", help = "Subscribe to unconfirmed transactions.")]
    pub transactions: Option<bool>,

    #[clap(long = "address", env = "BLOCKFEED_ADDRESSES", value_delimiter = ',', help = "Bitcoin addresses to watch (repeat or comma-separate).")]
    pub addresses: Option<Vec<String>>,

    #[clap(long, env = "BLOCKFEED_SYNTHETIC_INTERVAL_MS", help = "Cadence of synthetic events while degraded.")]
    pub synthetic_interval_ms: Option<u64>,

    #[clap(long, env = "BLOCKFEED_RECOVERY_INTERVAL_SECONDS", help = "Seconds between reconnect tries while degraded (0 disables).")]
    pub recovery_interval_seconds: Option<u64>,

    #[clap(long, env = "BLOCKFEED_SUMMARY_INTERVAL_SECONDS", help = "Seconds between throughput summaries.")]
    pub summary_interval_seconds: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            endpoints: other.endpoints.or(self.endpoints),
            secure_only: other.secure_only.or(self.secure_only),
            open_timeout_ms: other.open_timeout_ms.or(self.open_timeout_ms),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            blocks: other.blocks.or(self.blocks),
            transactions: other.transactions.or(self.transactions),
            addresses: other.addresses.or(self.addresses),
            synthetic_interval_ms: other.synthetic_interval_ms.or(self.synthetic_interval_ms),
            recovery_interval_seconds: other.recovery_interval_seconds.or(self.recovery_interval_seconds),
            summary_interval_seconds: other.summary_interval_seconds.or(self.summary_interval_seconds),
        }
    }

    fn defaults() -> Config {
        let feed = FeedSettings::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            endpoints: Some(feed.endpoints),
            secure_only: Some(feed.secure_only),
            open_timeout_ms: Some(feed.open_timeout_ms),
            heartbeat_interval_ms: Some(feed.heartbeat_interval_ms),
            reconnect_base_delay_ms: Some(feed.reconnect_base_delay_ms),
            max_reconnect_attempts: Some(feed.max_reconnect_attempts),
            blocks: Some(true),
            transactions: Some(true),
            addresses: Some(Vec::new()),
            synthetic_interval_ms: Some(3000),
            recovery_interval_seconds: Some(300),
            summary_interval_seconds: Some(60),
            ..Default::default()
        }
    }

    /// The library settings this configuration describes.
    pub fn feed_settings(&self) -> FeedSettings {
        let defaults = FeedSettings::default();
        FeedSettings {
            endpoints: self.endpoints.clone().unwrap_or(defaults.endpoints),
            secure_only: self.secure_only.unwrap_or(defaults.secure_only),
            open_timeout_ms: self.open_timeout_ms.unwrap_or(defaults.open_timeout_ms),
            heartbeat_interval_ms: self.heartbeat_interval_ms.unwrap_or(defaults.heartbeat_interval_ms),
            reconnect_base_delay_ms: self.reconnect_base_delay_ms.unwrap_or(defaults.reconnect_base_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts.unwrap_or(defaults.max_reconnect_attempts),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Reads a JSON config file, falling back to `None` with a warning when it
/// is missing or unreadable.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers built-in defaults, then the JSON config file, then environment
/// variables and CLI arguments.
pub fn load_config() -> Config {
    let cli = Config::parse();
    layer(cli)
}

fn layer(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_blockfeed.conf"));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}
