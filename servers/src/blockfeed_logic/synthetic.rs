//! Stand-in events rendered while the live feed is degraded.
//!
//! The shapes follow the blockchain.info `block` and `utx` payloads so the
//! printer treats both sources the same way.

use lib_blockfeed::{EventTag, FeedMessage};
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::printer::{Source, Stats};

/// Height the synthetic chain starts counting from.
const START_HEIGHT: u64 = 840_000;
/// One synthetic block is produced for this many transactions.
const TXS_PER_BLOCK: u64 = 20;

fn random_hash(rng: &mut impl Rng) -> String {
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

fn random_address(rng: &mut impl Rng) -> String {
    let bytes: [u8; 12] = rng.random();
    format!("1mock{}", hex::encode(bytes))
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn synthetic_block(rng: &mut impl Rng, height: u64) -> FeedMessage {
    let payload = json!({
        "height": height,
        "hash": format!("00000000000000000{}", &random_hash(rng)[17..]),
        "nTx": rng.random_range(1500..4000u64),
        "size": rng.random_range(800_000..2_000_000u64),
        "time": now_secs(),
    });
    message(EventTag::Block, payload)
}

pub fn synthetic_transaction(rng: &mut impl Rng) -> FeedMessage {
    let inputs: Vec<Value> = (0..rng.random_range(1..=3))
        .map(|_| json!({"prev_out": {"addr": random_address(rng), "value": rng.random_range(10_000..10_000_000u64)}}))
        .collect();
    let input_total: u64 = inputs.iter().filter_map(|i| i["prev_out"]["value"].as_u64()).sum();

    // Outputs share the inputs minus a fee, so the fee is never negative.
    let fee = rng.random_range(500..=input_total.min(20_000));
    let output_count = rng.random_range(1..=3u64);
    let mut remaining = input_total - fee;
    let mut outputs = Vec::new();
    for n in 0..output_count {
        let value = if n + 1 == output_count { remaining } else { rng.random_range(0..=remaining) };
        remaining -= value;
        outputs.push(json!({"addr": random_address(rng), "n": n, "value": value}));
    }

    let payload = json!({
        "hash": random_hash(rng),
        "ver": 1,
        "vin_sz": inputs.len(),
        "vout_sz": outputs.len(),
        "lock_time": 0,
        "size": rng.random_range(500..2000u64),
        "relayed_by": "0.0.0.0",
        "time": now_secs(),
        "inputs": inputs,
        "out": outputs,
    });
    message(EventTag::UnconfirmedTransaction, payload)
}

fn message(tag: EventTag, payload: Value) -> FeedMessage {
    let record = json!({"op": tag.as_op(), "x": payload});
    FeedMessage { tag, payload, record }
}

/// Renders synthetic events every `cadence` for as long as `degraded` stays true.
pub async fn run(cadence: Duration, stats: Arc<Stats>, mut degraded: watch::Receiver<bool>) {
    log::warn!("Live feed degraded, rendering synthetic data every {:?}", cadence);
    let mut ticker = tokio::time::interval(cadence);
    let mut height = START_HEIGHT;
    let mut produced = 0u64;

    loop {
        tokio::select! {
            changed = degraded.changed() => {
                if changed.is_err() || !*degraded.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let message = {
                    let mut rng = rand::rng();
                    produced += 1;
                    if produced % TXS_PER_BLOCK == 0 {
                        height += 1;
                        synthetic_block(&mut rng, height)
                    } else {
                        synthetic_transaction(&mut rng)
                    }
                };
                stats.record(&message, Source::Synthetic);
            }
        }
    }
    log::info!("Live feed restored, synthetic data stopped after {} events", produced);
}
