use anyhow::Result;
use lib_blockfeed::{BlockchainFeed, ConnectOutcome, EventTag, FeedError, FeedMessage, WsTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::interval;

mod blockfeed_logic;
use blockfeed_logic::config::{self, Config};
use blockfeed_logic::logger;
use blockfeed_logic::printer::{Source, Stats};
use blockfeed_logic::synthetic;

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), config.log_level())?;

    let feed = BlockchainFeed::spawn(config.feed_settings(), Arc::new(WsTransport::new()))?;
    let stats = Arc::new(Stats::default());

    for tag in [EventTag::Block, EventTag::UnconfirmedTransaction] {
        let stats = Arc::clone(&stats);
        feed.on_message(tag, move |message: &FeedMessage| stats.record(message, Source::Live));
    }
    feed.on_error(|error: &FeedError| log::warn!("Feed error: {}", error));

    if config.blocks.unwrap_or(true) {
        feed.subscribe_new_blocks();
    }
    if config.transactions.unwrap_or(true) {
        feed.subscribe_new_transactions();
    }
    for addr in config.addresses.clone().unwrap_or_default() {
        log::info!("Watching address {}", addr);
        feed.subscribe_address(addr);
    }

    match feed.connect().await {
        ConnectOutcome::Live => log::info!("Live feed connected."),
        outcome => log::warn!("Live feed unavailable ({:?}).", outcome),
    }

    let supervisor = tokio::spawn(supervise(feed.clone(), config.clone(), Arc::clone(&stats)));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    supervisor.abort();
    feed.disconnect().await;

    log::info!("Totals: {}", stats.summary());
    log::info!("Shutdown complete.");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}

/// Starts the synthetic generator whenever the feed degrades, periodically
/// retries the live feed while degraded, and logs running totals.
async fn supervise(feed: BlockchainFeed, config: Config, stats: Arc<Stats>) {
    let cadence = Duration::from_millis(config.synthetic_interval_ms.unwrap_or(3000).max(1));
    let recovery_secs = config.recovery_interval_seconds.unwrap_or(300);
    let mut recovery = interval(Duration::from_secs(recovery_secs.max(1)));
    let mut summary = interval(Duration::from_secs(config.summary_interval_seconds.unwrap_or(60).max(1)));
    recovery.tick().await;
    summary.tick().await;

    let mut degraded = feed.degraded_watch();
    let mut generator: Option<JoinHandle<()>> = None;

    loop {
        let is_degraded = *degraded.borrow_and_update();
        if is_degraded && generator.as_ref().is_none_or(JoinHandle::is_finished) {
            generator = Some(tokio::spawn(synthetic::run(
                cadence,
                Arc::clone(&stats),
                feed.degraded_watch(),
            )));
        }

        tokio::select! {
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = summary.tick() => {
                log::info!("Feed summary ({:?}): {}", feed.state(), stats.summary());
            }
            _ = recovery.tick(), if recovery_secs > 0 && is_degraded => {
                log::info!("Retrying the live feed.");
                match feed.connect().await {
                    ConnectOutcome::Live => log::info!("Live feed recovered."),
                    outcome => log::warn!("Live feed still unavailable ({:?}).", outcome),
                }
            }
        }
    }

    if let Some(generator) = generator {
        generator.abort();
    }
}
