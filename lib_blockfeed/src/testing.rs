//! Scripted in-memory transport for exercising the feed under a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::transport::{Connection, Transport, TransportError};

/// What the next `open` call does.
pub(crate) enum Script {
    /// Never completes; only the open timeout ends it.
    Hang,
    /// Fails straight away.
    Refuse,
    /// Succeeds with the given connection.
    Accept(FakeConnection),
}

/// Transport whose `open` calls follow a script. Once the script runs out
/// every further open is refused.
pub(crate) struct FakeTransport {
    supported: bool,
    script: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            supported: true,
            script: Mutex::new(script.into()),
            opened: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub(crate) fn unsupported() -> Arc<Self> {
        Arc::new(Self {
            supported: false,
            script: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub(crate) fn push(&self, step: Script) {
        self.script.lock().unwrap().push_back(step);
    }

    /// URIs passed to `open`, in call order.
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { count: Arc::clone(count) }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn open(&self, uri: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.opened.lock().unwrap().push(uri.to_string());
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Refuse);

        match step {
            Script::Hang => std::future::pending().await,
            Script::Refuse => Err(TransportError::Open {
                uri: uri.to_string(),
                reason: "connection refused".to_string(),
            }),
            Script::Accept(connection) => Ok(Box::new(connection)),
        }
    }
}

enum Inbound {
    Frame(String),
    Error(String),
    Close,
}

pub(crate) struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// Test-side controls for one [`FakeConnection`].
#[derive(Clone)]
pub(crate) struct ConnHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// An `Accept` step plus the handle controlling the connection it yields.
pub(crate) fn accepting() -> (Script, ConnHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let fail_sends = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));

    let connection = FakeConnection {
        inbound: rx,
        sent: Arc::clone(&sent),
        fail_sends: Arc::clone(&fail_sends),
        closed: Arc::clone(&closed),
    };
    let handle = ConnHandle { inbound: tx, sent, fail_sends, closed };
    (Script::Accept(connection), handle)
}

impl ConnHandle {
    /// Queues an inbound text frame.
    pub(crate) fn push(&self, frame: &str) {
        let _ = self.inbound.send(Inbound::Frame(frame.to_string()));
    }

    /// Makes the next receive fail.
    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.inbound.send(Inbound::Error(reason.to_string()));
    }

    /// Makes the next receive report a clean remote close.
    pub(crate) fn hang_up(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    /// Makes every later send fail.
    pub(crate) fn break_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Frames successfully sent so far.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        match self.inbound.recv().await? {
            Inbound::Frame(text) => Some(Ok(text)),
            Inbound::Error(reason) => Some(Err(TransportError::Receive(reason))),
            Inbound::Close => None,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Asserts `since.elapsed()` is `expected`, allowing for millisecond timer rounding.
#[track_caller]
pub(crate) fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "expected {:?} to elapse, got {:?}",
        expected,
        elapsed
    );
}
