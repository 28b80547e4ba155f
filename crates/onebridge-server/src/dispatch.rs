//! Event handler table and the dispatcher task that runs it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use onebridge_core::{Event, EventKind, PeerId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::api::BotApi;
use crate::metrics::{
    EVENTS_DISPATCHED_TOTAL, EVENTS_DROPPED_TOTAL, HANDLER_DURATION_SECONDS, HANDLER_ERRORS_TOTAL,
};

/// Upper bound on one handler invocation.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure reported by an [`EventHandler`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A correlated call got no response.
    #[error("action {0} got no response")]
    NoResponse(String),
    /// Anything else the handler wants to surface.
    #[error("{0}")]
    Failed(String),
}

/// What a handler sees besides the event.
#[derive(Clone)]
pub struct HandlerContext {
    /// Bot that produced the event.
    pub peer: PeerId,
    /// Actions API for replying.
    pub api: BotApi,
}

/// Reacts to one kind of inbound event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle `event`.
    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError>;

    /// Label used in logs and metrics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Static mapping from [`EventKind`] to handlers, run in registration order.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: impl EventHandler + 'static) {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, kind: EventKind, handler: impl EventHandler + 'static) -> Self {
        self.register(kind, handler);
        self
    }

    /// Handlers for `kind`, in registration order.
    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Dispatch {
    peer: PeerId,
    event: Event,
}

/// Queue feeding the dispatcher task.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<Dispatch>,
}

impl EventDispatcher {
    /// Start the dispatcher task. It stops when `shutdown` fires or every
    /// [`EventDispatcher`] clone is dropped.
    pub fn spawn(
        table: HandlerTable,
        api: BotApi,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_dispatcher(Arc::new(table), api, rx, shutdown));
        (Self { tx }, handle)
    }

    /// Queue `event` from `peer` without waiting. `false` if it was dropped.
    pub fn submit(&self, peer: PeerId, event: Event) -> bool {
        let kind = event.kind();
        match self.tx.try_send(Dispatch { peer, event }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%peer, %kind, "event queue full, dropping event");
                counter!(EVENTS_DROPPED_TOTAL, "reason" => "full").increment(1);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%peer, %kind, "dispatcher stopped, dropping event");
                counter!(EVENTS_DROPPED_TOTAL, "reason" => "closed").increment(1);
                false
            }
        }
    }
}

async fn run_dispatcher(
    table: Arc<HandlerTable>,
    api: BotApi,
    mut rx: mpsc::Receiver<Dispatch>,
    shutdown: CancellationToken,
) {
    info!(handlers = table.len(), "event dispatcher started");
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(Dispatch { peer, event }) = next else { break };

        let kind = event.kind();
        counter!(EVENTS_DISPATCHED_TOTAL, "kind" => kind.as_str()).increment(1);
        if table.handlers_for(kind).is_empty() {
            trace!(%peer, %kind, "no handlers registered");
            continue;
        }

        let table = table.clone();
        let ctx = HandlerContext { peer, api: api.clone() };
        let _ = tokio::spawn(async move { run_handlers(&table, &ctx, &event).await });
    }
    info!("event dispatcher stopped");
}

async fn run_handlers(table: &HandlerTable, ctx: &HandlerContext, event: &Event) {
    let kind = event.kind();
    for handler in table.handlers_for(kind) {
        let started = Instant::now();
        let name = handler.name().to_owned();
        match tokio::time::timeout(HANDLER_TIMEOUT, handler.handle(ctx, event)).await {
            Ok(Ok(())) => {
                trace!(peer = %ctx.peer, %kind, handler = %name, "handler finished");
            }
            Ok(Err(err)) => {
                warn!(peer = %ctx.peer, %kind, handler = %name, error = %err, "handler failed");
                counter!(HANDLER_ERRORS_TOTAL, "handler" => name.clone()).increment(1);
            }
            Err(_) => {
                error!(peer = %ctx.peer, %kind, handler = %name, "handler timed out after {HANDLER_TIMEOUT:?}");
                counter!(HANDLER_ERRORS_TOTAL, "handler" => name.clone()).increment(1);
            }
        }
        histogram!(HANDLER_DURATION_SECONDS, "handler" => name).record(started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use onebridge_core::parse_event_at;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::correlator::Correlator;
    use crate::registry::MockPeerSender;

    const NOW: i64 = 1_700_000_000;

    fn api() -> BotApi {
        let mut sender = MockPeerSender::new();
        let _ = sender.expect_send_frame().return_const(false);
        BotApi::new(Arc::new(Correlator::new(Arc::new(sender), Duration::from_secs(1))))
    }

    fn connect_event(self_id: i64) -> Event {
        let raw = json!({
            "time": NOW,
            "self_id": self_id,
            "post_type": "meta_event",
            "meta_event_type": "lifecycle",
            "sub_type": "connect"
        });
        parse_event_at(&raw.to_string(), NOW).unwrap()
    }

    /// Appends its tag to a shared log, then signals.
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<(&'static str, PeerId)>>>,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, ctx: &HandlerContext, _event: &Event) -> Result<(), HandlerError> {
            self.log.lock().push((self.tag, ctx.peer));
            let _ = self.done.send(());
            Ok(())
        }
    }

    struct Failing(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _ctx: &HandlerContext, _event: &Event) -> Result<(), HandlerError> {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::Failed("boom".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn table_keeps_registration_order() {
        let (done, _rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let table = HandlerTable::new()
            .with(EventKind::Connect, Recorder { tag: "a", log: log.clone(), done: done.clone() })
            .with(EventKind::Connect, Failing(Arc::new(AtomicUsize::new(0))))
            .with(EventKind::GroupMessage, Recorder { tag: "b", log, done });

        let names: Vec<_> = table.handlers_for(EventKind::Connect).iter().map(|h| h.name().to_owned()).collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("Recorder"));
        assert_eq!(names[1], "failing");
        assert_eq!(table.len(), 3);
        assert!(table.handlers_for(EventKind::Heartbeat).is_empty());
        assert!(HandlerTable::new().is_empty());
    }

    #[tokio::test]
    async fn handlers_run_in_order_and_failures_do_not_stop_the_chain() {
        let (done, mut done_rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(AtomicUsize::new(0));
        let table = HandlerTable::new()
            .with(EventKind::Connect, Recorder { tag: "first", log: log.clone(), done: done.clone() })
            .with(EventKind::Connect, Failing(failures.clone()))
            .with(EventKind::Connect, Recorder { tag: "third", log: log.clone(), done });

        let token = CancellationToken::new();
        let (dispatcher, handle) = EventDispatcher::spawn(table, api(), 8, token.clone());
        assert!(dispatcher.submit(PeerId::new(42), connect_event(42)));

        done_rx.recv().await.unwrap();
        done_rx.recv().await.unwrap();
        assert_eq!(*log.lock(), vec![("first", PeerId::new(42)), ("third", PeerId::new(42))]);
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let token = CancellationToken::new();
        let (dispatcher, handle) = EventDispatcher::spawn(HandlerTable::new(), api(), 8, token.clone());
        token.cancel();
        handle.await.unwrap();
        assert!(!dispatcher.submit(PeerId::new(1), connect_event(1)));
    }

    #[tokio::test]
    async fn full_queue_drops_event() {
        let (tx, _rx) = mpsc::channel(1);
        let dispatcher = EventDispatcher { tx };
        assert!(dispatcher.submit(PeerId::new(1), connect_event(1)));
        assert!(!dispatcher.submit(PeerId::new(1), connect_event(1)));
    }
}
