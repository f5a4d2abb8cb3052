//! # Blockchain WSS Live Feed Test
//!
//! Connects to the public blockchain.info feed through lib_blockfeed,
//! subscribes to blocks and unconfirmed transactions, and prints what
//! arrives for a fixed window.

use clap::Parser;
use lib_blockfeed::{BlockchainFeed, ConnectOutcome, EventTag, FeedMessage, FeedSettings, WsTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(about = "Live smoke test for the blockchain.info feed")]
struct Args {
    /// Endpoints to try in order; defaults to the public feed.
    #[clap(long = "endpoint")]
    endpoints: Vec<String>,

    /// Seconds to listen before disconnecting.
    #[clap(long, default_value_t = 30)]
    seconds: u64,
}

/// Executes the live feed check.
///
/// // Statement: Exits non-zero when the feed degrades or nothing arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let args = Args::parse();

    let settings = if args.endpoints.is_empty() {
        FeedSettings::default()
    } else {
        FeedSettings::with_endpoints(args.endpoints)
    };

    let feed = BlockchainFeed::spawn(settings, Arc::new(WsTransport::new()))?;
    let received = Arc::new(AtomicUsize::new(0));

    // // Statement: Count and print each transaction and block
    {
        let received = Arc::clone(&received);
        feed.on_message(EventTag::UnconfirmedTransaction, move |msg: &FeedMessage| {
            let n = received.fetch_add(1, Ordering::Relaxed) + 1;
            if n <= 5 {
                println!("[utx] {}", msg.payload["hash"].as_str().unwrap_or("?"));
            }
        });
    }
    feed.on_message(EventTag::Block, |msg: &FeedMessage| {
        println!("[block] #{} {}", msg.payload["height"], msg.payload["hash"]);
    });
    feed.on_error(|e| eprintln!("[feed error] {}", e));

    feed.subscribe_new_blocks();
    feed.subscribe_new_transactions();

    println!("[*] Connecting to the live feed...");
    match feed.connect().await {
        ConnectOutcome::Live => println!("✅ Connected ({:?})", feed.state()),
        outcome => {
            eprintln!("\n[ERROR] Feed did not come up: {:?}", outcome);
            std::process::exit(1);
        }
    }

    println!("[*] Listening for {}s...", args.seconds);
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    feed.disconnect().await;

    let total = received.load(Ordering::Relaxed);
    println!("-----------------------------------------------");
    println!("Unconfirmed transactions received: {}", total);
    println!("Subscriptions held: {:?}", feed.subscriptions().await);
    println!("-----------------------------------------------");

    if total == 0 {
        eprintln!("[ERROR] No transactions arrived in {}s", args.seconds);
        std::process::exit(1);
    }
    println!("✅ Live feed OK");
    Ok(())
}
