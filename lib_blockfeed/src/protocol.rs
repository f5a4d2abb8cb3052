//! # Feed Wire Protocol
//!
//! Frame shapes spoken with the blockchain.info `/inv` WebSocket feed.
//!
//! Every frame, in both directions, is a UTF-8 JSON object carrying an `op`
//! field. Outbound frames are produced from the closed enums below through
//! serde's internally tagged representation, so `Subscription::Address`
//! serializes as `{"op":"addr_sub","addr":"..."}`. Inbound frames are parsed
//! loosely: the dispatcher only needs the `op` tag and the `x` payload, and
//! every other field is tolerated and carried along untouched.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A logical subscription requested by the caller.
///
/// Subscriptions are compared structurally, so two `Address` subscriptions
/// for the same address are the same subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Subscription {
    /// Notify on every newly mined block.
    #[serde(rename = "blocks_sub")]
    NewBlocks,
    /// Notify on every new unconfirmed transaction.
    #[serde(rename = "unconfirmed_sub")]
    NewTransactions,
    /// Notify on transactions touching one address.
    #[serde(rename = "addr_sub")]
    Address {
        /// The watched address.
        addr: String,
    },
}

/// The fieldless discriminant of a [`Subscription`], used by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// All `NewBlocks` subscriptions.
    NewBlocks,
    /// All `NewTransactions` subscriptions.
    NewTransactions,
    /// Every `Address` subscription, whatever the address.
    AddressWatch,
}

impl Subscription {
    /// Watch a single address.
    pub fn address(addr: impl Into<String>) -> Self {
        Subscription::Address { addr: addr.into() }
    }

    /// Returns the kind this subscription belongs to.
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Subscription::NewBlocks => SubscriptionKind::NewBlocks,
            Subscription::NewTransactions => SubscriptionKind::NewTransactions,
            Subscription::Address { .. } => SubscriptionKind::AddressWatch,
        }
    }

    /// The frame that activates this subscription on the remote service.
    pub fn subscribe_frame(&self) -> String {
        encode(self)
    }

    /// The frame that cancels this subscription on the remote service.
    pub fn cancel_frame(&self) -> String {
        let control = match self {
            Subscription::NewBlocks => ControlFrame::BlocksUnsub,
            Subscription::NewTransactions => ControlFrame::UnconfirmedUnsub,
            Subscription::Address { addr } => ControlFrame::AddrUnsub { addr: addr.clone() },
        };
        encode(&control)
    }
}

/// Frames the feed sends that are not subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op")]
pub enum ControlFrame {
    /// Liveness probe, answered by the service with a `pong`.
    #[serde(rename = "ping")]
    Ping,
    /// Cancels `blocks_sub`.
    #[serde(rename = "blocks_unsub")]
    BlocksUnsub,
    /// Cancels `unconfirmed_sub`.
    #[serde(rename = "unconfirmed_unsub")]
    UnconfirmedUnsub,
    /// Cancels one `addr_sub`.
    #[serde(rename = "addr_unsub")]
    AddrUnsub {
        /// The address that is no longer watched.
        addr: String,
    },
}

impl ControlFrame {
    /// Serializes the frame to its wire text.
    pub fn to_frame(&self) -> String {
        encode(self)
    }
}

/// Event-type tags the dispatcher routes on.
///
/// The set is closed. Tags the service sends that are not listed here are
/// legal on the wire but never reach a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// A newly mined block (`op: "block"`).
    Block,
    /// A new unconfirmed transaction (`op: "utx"`), also used for address watches.
    UnconfirmedTransaction,
    /// Reply to a heartbeat ping (`op: "pong"`).
    Pong,
}

impl EventTag {
    /// Maps a wire `op` value to a tag, returning `None` for unknown tags.
    pub fn from_op(op: &str) -> Option<Self> {
        match op {
            "block" => Some(EventTag::Block),
            "utx" => Some(EventTag::UnconfirmedTransaction),
            "pong" => Some(EventTag::Pong),
            _ => None,
        }
    }

    /// The wire `op` value of this tag.
    pub fn as_op(&self) -> &'static str {
        match self {
            EventTag::Block => "block",
            EventTag::UnconfirmedTransaction => "utx",
            EventTag::Pong => "pong",
        }
    }
}

/// One parsed inbound frame, as handed to message callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    /// The routed tag.
    pub tag: EventTag,
    /// The kind-specific payload (`x` on the wire), `Value::Null` when absent.
    pub payload: Value,
    /// The complete record, unknown fields included.
    pub record: Value,
}

/// Why an inbound frame could not be turned into a [`FeedMessage`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame is JSON but has no string `op` field.
    #[error("frame has no op tag")]
    MissingTag,
    /// The `op` tag is not one the feed routes.
    #[error("unrouted op tag '{0}'")]
    UnknownTag(String),
}

/// Parses raw inbound text into a routed message.
pub fn parse_frame(raw: &str) -> Result<FeedMessage, FrameError> {
    let record: Value = serde_json::from_str(raw)?;
    let op = record
        .get("op")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingTag)?;
    let tag = EventTag::from_op(op).ok_or_else(|| FrameError::UnknownTag(op.to_string()))?;
    let payload = record.get("x").cloned().unwrap_or(Value::Null);

    Ok(FeedMessage { tag, payload, record })
}

fn encode<T: Serialize>(frame: &T) -> String {
    // Unit and string-field variants of a tagged enum always serialize.
    serde_json::to_string(frame).unwrap_or_default()
}
