//! # Message Dispatcher
//!
//! Fans inbound frames out to the callbacks registered for their event tag.
//!
//! ## Core Design Principles:
//!
//! 1.  **Never crash the reactor**: a frame that is not JSON, has no `op` tag,
//!     or carries a tag nobody routes is logged and dropped. `dispatch` has no
//!     error path.
//!
//! 2.  **Callback isolation**: every callback runs inside its own
//!     `catch_unwind`. A panicking callback is logged and its siblings for the
//!     same tag still run, in registration order.
//!
//! 3.  **Registration from any thread**: the callback table sits behind a
//!     `Mutex` so handles can register while the reactor is dispatching. The
//!     lock is released before callbacks run, so a callback may itself
//!     register further callbacks.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::protocol::{parse_frame, EventTag, FeedMessage, FrameError};
use crate::FeedError;

/// A registered message callback.
pub type MessageCallback = Arc<dyn Fn(&FeedMessage) + Send + Sync>;

/// The single error observer slot.
pub type ErrorCallback = Arc<dyn Fn(&FeedError) + Send + Sync>;

/// # Core Dispatcher
///
/// Owns the callback table and the error observer.
#[derive(Default)]
pub struct Dispatcher {
    callbacks: Mutex<HashMap<EventTag, Vec<MessageCallback>>>,
    error_observer: Mutex<Option<ErrorCallback>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback for `tag`. Callbacks are never removed.
    pub fn register(&self, tag: EventTag, callback: MessageCallback) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.entry(tag).or_default().push(callback);
        log::debug!("Registered callback for '{}'", tag.as_op());
    }

    /// Replaces the error observer.
    pub fn set_error_observer(&self, observer: ErrorCallback) {
        *self.error_observer.lock().unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    /// Number of callbacks registered for `tag`.
    pub fn callback_count(&self, tag: EventTag) -> usize {
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.get(&tag).map_or(0, Vec::len)
    }

    /// # Dispatch
    ///
    /// Parses `raw` and hands the resulting message to every callback
    /// registered for its tag. Returns how many callbacks completed without
    /// panicking.
    pub fn dispatch(&self, raw: &str) -> usize {
        let message = match parse_frame(raw) {
            Ok(message) => message,
            Err(FrameError::UnknownTag(op)) => {
                log::debug!("No route for op '{}', dropping frame", op);
                return 0;
            }
            Err(e) => {
                log::warn!("Dropping inbound frame: {}", e);
                return 0;
            }
        };

        // Clone the handles out so the table is unlocked while callbacks run.
        let targets: Vec<MessageCallback> = {
            let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            callbacks.get(&message.tag).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        for callback in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&message))) {
                Ok(()) => delivered += 1,
                Err(cause) => log::error!(
                    "Callback for '{}' panicked: {}",
                    message.tag.as_op(),
                    panic_text(cause.as_ref())
                ),
            }
        }
        delivered
    }

    /// Reports `error` to the observer, if one is set. A panicking observer is
    /// logged and otherwise ignored.
    pub fn report_error(&self, error: &FeedError) {
        let observer = self
            .error_observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if let Some(observer) = observer {
            if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| observer(error))) {
                log::error!("Error observer panicked: {}", panic_text(cause.as_ref()));
            }
        }
    }
}

fn panic_text(cause: &(dyn Any + Send)) -> &str {
    if let Some(text) = cause.downcast_ref::<&str>() {
        text
    } else if let Some(text) = cause.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}
