//! # Subscription Registry
//!
//! Remembers which logical subscriptions the caller wants, independently of
//! whether a connection currently exists. The feed replays the whole set on
//! every successful open, so subscriptions survive reconnects and are only
//! dropped by an explicit unsubscribe.
//!
//! The registry is a set: structural duplicates collapse into one entry and
//! iteration order carries no meaning.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::collections::HashSet;

use crate::protocol::{Subscription, SubscriptionKind};

/// The set of subscriptions to keep active.
#[derive(Debug, Default)]
pub struct Registry {
    subscriptions: HashSet<Subscription>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. Returns `true` if it was not already tracked.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        let inserted = self.subscriptions.insert(subscription);
        if !inserted {
            log::debug!("Subscription already tracked, ignoring duplicate");
        }
        inserted
    }

    /// Removes every subscription of `kind` and returns what was removed, so
    /// the caller can send the matching cancel frames.
    pub fn unsubscribe(&mut self, kind: SubscriptionKind) -> Vec<Subscription> {
        let removed: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect();

        for subscription in &removed {
            self.subscriptions.remove(subscription);
        }
        removed
    }

    /// Every frame needed to restore the tracked subscriptions on a fresh connection.
    pub fn replay_frames(&self) -> Vec<String> {
        self.subscriptions.iter().map(Subscription::subscribe_frame).collect()
    }

    /// A snapshot of the tracked subscriptions.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.iter().cloned().collect()
    }

    /// Number of tracked subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_subscriptions_collapse() {
        let mut registry = Registry::new();
        assert!(registry.subscribe(Subscription::NewBlocks));
        assert!(!registry.subscribe(Subscription::NewBlocks));
        assert!(registry.subscribe(Subscription::address("1abc")));
        assert!(!registry.subscribe(Subscription::address("1abc")));
        assert!(registry.subscribe(Subscription::address("1def")));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unsubscribe_removes_whole_kind() {
        let mut registry = Registry::new();
        registry.subscribe(Subscription::NewTransactions);
        registry.subscribe(Subscription::address("1abc"));
        registry.subscribe(Subscription::address("1def"));

        let mut removed = registry.unsubscribe(SubscriptionKind::AddressWatch);
        removed.sort_by_key(|s| s.subscribe_frame());
        assert_eq!(removed, vec![Subscription::address("1abc"), Subscription::address("1def")]);
        assert_eq!(registry.snapshot(), vec![Subscription::NewTransactions]);

        assert!(registry.unsubscribe(SubscriptionKind::NewBlocks).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn replay_covers_every_entry_once() {
        let mut registry = Registry::new();
        registry.subscribe(Subscription::NewBlocks);
        registry.subscribe(Subscription::NewTransactions);
        registry.subscribe(Subscription::NewBlocks);

        let mut frames = registry.replay_frames();
        frames.sort();
        assert_eq!(frames, vec![r#"{"op":"blocks_sub"}"#, r#"{"op":"unconfirmed_sub"}"#]);
    }
}
