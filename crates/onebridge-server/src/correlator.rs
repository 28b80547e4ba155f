//! Request/response correlation over a fire-and-forget transport.
//!
//! Each call registers a single-use slot keyed by a fresh `echo`, sends the
//! request through a [`PeerSender`], and waits for the matching response or
//! the timeout. The slot is removed on every exit path, including the caller
//! dropping the future.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use onebridge_core::{Echo, OneBotRequest, OneBotResponse, PeerId};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::metrics::{CALL_DURATION_SECONDS, CALL_OUTCOMES_TOTAL, CALLS_TOTAL, UNMATCHED_RESPONSES_TOTAL};
use crate::registry::PeerSender;

/// What happened to a response handed to [`Correlator::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Delivered to the waiting caller.
    Delivered,
    /// No pending call has this echo (unknown, duplicate, or late).
    Unmatched,
    /// The slot existed but its caller had already gone away.
    Abandoned,
}

type EchoSource = Box<dyn Fn() -> Echo + Send + Sync>;

struct Pending {
    peer: PeerId,
    tx: oneshot::Sender<OneBotResponse>,
}

type PendingTable = Mutex<HashMap<Echo, Pending>>;

/// Removes a pending slot when the call finishes or is dropped.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    echo: Echo,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.table.lock().remove(&self.echo);
    }
}

/// Pending call table plus the sender used to transmit requests.
pub struct Correlator {
    sender: Arc<dyn PeerSender>,
    pending: PendingTable,
    default_timeout: Duration,
    echo_source: EchoSource,
}

impl Correlator {
    /// Correlator transmitting through `sender`.
    pub fn new(sender: Arc<dyn PeerSender>, default_timeout: Duration) -> Self {
        Self {
            sender,
            pending: Mutex::new(HashMap::new()),
            default_timeout,
            echo_source: Box::new(Echo::random),
        }
    }

    /// Replace the echo generator.
    #[must_use]
    pub fn with_echo_source(mut self, source: impl Fn() -> Echo + Send + Sync + 'static) -> Self {
        self.echo_source = Box::new(source);
        self
    }

    /// Timeout applied when a call passes `None`.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send `action` to `peer` and wait for its response.
    ///
    /// Returns `None` if the peer is not reachable, the wait times out, or
    /// the call is abandoned.
    #[instrument(skip(self, params), fields(%peer))]
    pub async fn call(
        &self,
        peer: PeerId,
        action: &str,
        params: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Option<OneBotResponse> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        counter!(CALLS_TOTAL, "action" => action.to_owned()).increment(1);

        let (echo, rx) = self.register(peer);
        let _guard = PendingGuard {
            table: &self.pending,
            echo,
        };

        let frame = match OneBotRequest::new(action, params, echo).to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%echo, error = %err, "failed to encode request");
                record_outcome("encode_failed", started);
                return None;
            }
        };

        if !self.sender.send_frame(peer, Arc::new(frame)) {
            debug!(%echo, "request not delivered");
            record_outcome("send_failed", started);
            return None;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                record_outcome("ok", started);
                Some(response)
            }
            Ok(Err(_)) => {
                debug!(%echo, "call abandoned");
                record_outcome("abandoned", started);
                None
            }
            Err(_) => {
                debug!(%echo, ?timeout, "call timed out");
                record_outcome("timeout", started);
                None
            }
        }
    }

    /// Deliver `response`, received from `peer`, to the call waiting on its
    /// echo. A response from any identity other than the one the call went
    /// to is unmatched and leaves the call waiting.
    pub fn resolve(&self, peer: PeerId, response: OneBotResponse) -> ResolveOutcome {
        let echo = response.correlation_id;
        let pending = {
            let mut table = self.pending.lock();
            match table.get(&echo) {
                Some(pending) if pending.peer == peer => table.remove(&echo),
                Some(pending) => {
                    warn!(%echo, %peer, expected = %pending.peer, "response from wrong peer, dropping");
                    None
                }
                None => {
                    warn!(%echo, %peer, "response matches no pending call, dropping");
                    None
                }
            }
        };
        let Some(pending) = pending else {
            counter!(UNMATCHED_RESPONSES_TOTAL).increment(1);
            return ResolveOutcome::Unmatched;
        };

        if pending.tx.send(response).is_ok() {
            debug!(%echo, %peer, "response delivered");
            ResolveOutcome::Delivered
        } else {
            debug!(%echo, "caller gave up before response arrived");
            ResolveOutcome::Abandoned
        }
    }

    /// Fail every pending call issued to `peer`. Returns how many.
    pub fn abandon_peer(&self, peer: PeerId) -> usize {
        let mut table = self.pending.lock();
        let before = table.len();
        table.retain(|_, pending| pending.peer != peer);
        let abandoned = before - table.len();
        if abandoned > 0 {
            debug!(%peer, abandoned, "abandoned pending calls");
        }
        abandoned
    }

    /// Calls currently waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn register(&self, peer: PeerId) -> (Echo, oneshot::Receiver<OneBotResponse>) {
        let (tx, rx) = oneshot::channel();
        let mut table = self.pending.lock();
        let mut echo = (self.echo_source)();
        while table.contains_key(&echo) {
            warn!(%echo, "echo collision, regenerating");
            echo = (self.echo_source)();
        }
        let _ = table.insert(echo, Pending { peer, tx });
        (echo, rx)
    }
}

fn record_outcome(outcome: &'static str, started: Instant) {
    counter!(CALL_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(CALL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
