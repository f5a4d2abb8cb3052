use lib_blockfeed::{EventTag, FeedMessage};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Where a rendered event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Synthetic,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Live => write!(f, "live"),
            Source::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Input and output sums of one transaction, in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxTotals {
    pub inputs: u64,
    pub outputs: u64,
}

impl TxTotals {
    pub fn of(tx: &Value) -> Self {
        let inputs = tx["inputs"]
            .as_array()
            .map(|inputs| inputs.iter().filter_map(|i| i["prev_out"]["value"].as_u64()).sum())
            .unwrap_or(0);
        let outputs = tx["out"]
            .as_array()
            .map(|outs| outs.iter().filter_map(|o| o["value"].as_u64()).sum())
            .unwrap_or(0);
        Self { inputs, outputs }
    }

    pub fn fee(&self) -> u64 {
        self.inputs.saturating_sub(self.outputs)
    }
}

fn btc(sats: u64) -> String {
    format!("{:.8} BTC", sats as f64 / SATS_PER_BTC)
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

pub fn block_line(block: &Value) -> String {
    format!(
        "Block #{} {} | {} txs | {} bytes",
        block["height"].as_u64().unwrap_or_default(),
        block["hash"].as_str().unwrap_or("?"),
        block["nTx"].as_u64().unwrap_or_default(),
        block["size"].as_u64().unwrap_or_default(),
    )
}

pub fn transaction_line(tx: &Value) -> String {
    let totals = TxTotals::of(tx);
    format!(
        "Tx {}.. | {} in / {} out | {} moved | fee {} | {} bytes",
        short_hash(tx["hash"].as_str().unwrap_or("?")),
        tx["vin_sz"].as_u64().unwrap_or_default(),
        tx["vout_sz"].as_u64().unwrap_or_default(),
        btc(totals.outputs),
        btc(totals.fee()),
        tx["size"].as_u64().unwrap_or_default(),
    )
}

/// Running totals across live and synthetic events.
#[derive(Debug, Default)]
pub struct Stats {
    blocks: AtomicU64,
    transactions: AtomicU64,
    moved_sats: AtomicU64,
}

impl Stats {
    /// Logs one event and folds it into the totals.
    pub fn record(&self, message: &FeedMessage, source: Source) {
        match message.tag {
            EventTag::Block => {
                self.blocks.fetch_add(1, Ordering::Relaxed);
                log::info!("[{}] {}", source, block_line(&message.payload));
            }
            EventTag::UnconfirmedTransaction => {
                self.transactions.fetch_add(1, Ordering::Relaxed);
                self.moved_sats
                    .fetch_add(TxTotals::of(&message.payload).outputs, Ordering::Relaxed);
                log::debug!("[{}] {}", source, transaction_line(&message.payload));
            }
            EventTag::Pong => log::trace!("[{}] pong", source),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} blocks, {} unconfirmed transactions, {} moved",
            self.blocks.load(Ordering::Relaxed),
            self.transactions.load(Ordering::Relaxed),
            btc(self.moved_sats.load(Ordering::Relaxed)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utx() -> Value {
        json!({
            "hash": "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16",
            "size": 275,
            "vin_sz": 1,
            "vout_sz": 2,
            "inputs": [{"prev_out": {"addr": "1abc", "value": 5_000_000_000u64}}],
            "out": [{"addr": "1def", "value": 1_000_000_000u64}, {"addr": "1abc", "value": 3_999_990_000u64}]
        })
    }

    #[test]
    fn fee_is_inputs_minus_outputs() {
        let totals = TxTotals::of(&utx());
        assert_eq!(totals.inputs, 5_000_000_000);
        assert_eq!(totals.outputs, 4_999_990_000);
        assert_eq!(totals.fee(), 10_000);
    }

    #[test]
    fn missing_fields_render_as_zero() {
        assert_eq!(TxTotals::of(&json!({})), TxTotals { inputs: 0, outputs: 0 });
        assert_eq!(block_line(&json!({"height": 7})), "Block #7 ? | 0 txs | 0 bytes");
    }

    #[test]
    fn transaction_line_shortens_hash() {
        let line = transaction_line(&utx());
        assert!(line.starts_with("Tx f4184fc596403b9d.. | 1 in / 2 out"));
        assert!(line.contains("fee 0.00010000 BTC"));
    }

    #[test]
    fn stats_accumulate_by_tag() {
        let stats = Stats::default();
        let tx = FeedMessage {
            tag: EventTag::UnconfirmedTransaction,
            payload: utx(),
            record: Value::Null,
        };
        stats.record(&tx, Source::Live);
        stats.record(&tx, Source::Synthetic);
        stats.record(
            &FeedMessage { tag: EventTag::Block, payload: json!({"height": 1}), record: Value::Null },
            Source::Live,
        );
        assert_eq!(stats.summary(), "1 blocks, 2 unconfirmed transactions, 99.99980000 BTC moved");
    }
}
