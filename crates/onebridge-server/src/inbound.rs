//! Post-handshake read loop for one bound connection.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use metrics::counter;
use onebridge_core::{Event, EventKind, InboundFrame, PeerId, parse};
use tracing::{debug, instrument, trace, warn};

use crate::connection::PeerConnection;
use crate::correlator::Correlator;
use crate::dispatch::EventDispatcher;
use crate::metrics::FRAMES_REJECTED_TOTAL;
use crate::registry::ConnectionRegistry;

/// Routes inbound frames: responses to the correlator, events to handlers.
#[derive(Clone)]
pub struct InboundLoop {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<Correlator>,
    dispatcher: EventDispatcher,
    abandon_calls_on_disconnect: bool,
}

impl InboundLoop {
    /// Wire up a loop.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<Correlator>,
        dispatcher: EventDispatcher,
        abandon_calls_on_disconnect: bool,
    ) -> Self {
        Self {
            registry,
            correlator,
            dispatcher,
            abandon_calls_on_disconnect,
        }
    }

    /// Read `frames` until the stream ends or `conn` is closed, then release
    /// the binding. Returns the number of frames processed.
    #[instrument(skip_all, fields(%peer, conn_id = %conn.id()))]
    pub async fn run<S>(&self, peer: PeerId, conn: &PeerConnection, frames: &mut S) -> u64
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut processed = 0_u64;
        loop {
            let text = tokio::select! {
                biased;
                () = conn.closed() => {
                    debug!("connection closed, leaving read loop");
                    break;
                }
                next = frames.next() => match next {
                    Some(text) => text,
                    None => {
                        debug!("transport ended");
                        break;
                    }
                },
            };
            processed += 1;
            self.handle_frame(peer, conn, &text);
        }

        // The binding may already be gone through `disconnect` or eviction.
        // Only a successor owning the identity keeps its calls alive.
        let superseded = self.registry.get(peer).is_some_and(|bound| bound.id() != conn.id());
        let _ = self.registry.release(peer, conn.id());
        if !superseded && self.abandon_calls_on_disconnect {
            let abandoned = self.correlator.abandon_peer(peer);
            if abandoned > 0 {
                warn!(abandoned, "peer disconnected with calls in flight");
            }
        }
        processed
    }

    /// Hand one event from `peer` to the handlers.
    ///
    /// Heartbeats also refresh the connection's liveness.
    pub fn deliver(&self, peer: PeerId, conn: &PeerConnection, event: Event) -> bool {
        if event.self_id() != peer {
            debug!(reported = %event.self_id(), "event self_id differs from bound identity");
        }
        if event.kind() == EventKind::Heartbeat {
            conn.mark_alive();
        }
        self.dispatcher.submit(peer, event)
    }

    fn handle_frame(&self, peer: PeerId, conn: &PeerConnection, text: &str) {
        match parse(text) {
            Ok(InboundFrame::Response(response)) => {
                trace!(echo = %response.correlation_id, "response frame");
                let _ = self.correlator.resolve(peer, response);
            }
            Ok(InboundFrame::Event(event)) => {
                let _ = self.deliver(peer, conn, event);
            }
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "dropping invalid frame");
                counter!(FRAMES_REJECTED_TOTAL, "reason" => err.kind()).increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use onebridge_core::{Echo, OneBotResponse};
    use serde_json::{Map, json};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::api::BotApi;
    use crate::dispatch::{EventHandler, HandlerContext, HandlerError, HandlerTable};

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .try_into()
            .unwrap()
    }

    fn heartbeat(self_id: i64) -> String {
        json!({
            "time": now(),
            "self_id": self_id,
            "post_type": "meta_event",
            "meta_event_type": "heartbeat",
            "status": {"online": true, "good": true},
            "interval": 5000
        })
        .to_string()
    }

    struct Forward(mpsc::UnboundedSender<Event>);

    #[async_trait::async_trait]
    impl EventHandler for Forward {
        async fn handle(&self, _ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
            let _ = self.0.send(event.clone());
            Ok(())
        }
    }

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<Correlator>,
        events: mpsc::UnboundedReceiver<Event>,
        inbound: InboundLoop,
        outbound: mpsc::Receiver<Arc<String>>,
        conn: Arc<PeerConnection>,
        _shutdown: CancellationToken,
    }

    fn harness(abandon: bool) -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let correlator = Arc::new(Correlator::new(registry.clone(), Duration::from_secs(3600)));
        let (event_tx, events) = mpsc::unbounded_channel();
        let table = HandlerTable::new().with(EventKind::Heartbeat, Forward(event_tx));
        let shutdown = CancellationToken::new();
        let (dispatcher, _handle) =
            EventDispatcher::spawn(table, BotApi::new(correlator.clone()), 16, shutdown.clone());
        let inbound = InboundLoop::new(registry.clone(), correlator.clone(), dispatcher, abandon);

        let (tx, outbound) = mpsc::channel(16);
        let conn = Arc::new(PeerConnection::new(tx));
        let _ = registry.bind(PeerId::new(42), conn.clone());
        Harness {
            registry,
            correlator,
            events,
            inbound,
            outbound,
            conn,
            _shutdown: shutdown,
        }
    }

    #[tokio::test]
    async fn bad_frames_are_skipped_and_events_dispatched() {
        let mut h = harness(false);
        let mut frames = stream::iter(vec![
            "not json".to_string(),
            json!({"post_type": "notice"}).to_string(),
            heartbeat(42),
        ]);

        let processed = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert_eq!(processed, 3);
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Heartbeat);
    }

    #[tokio::test]
    async fn stream_end_releases_binding() {
        let h = harness(false);
        let mut frames = stream::iter(Vec::<String>::new());
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert!(!h.registry.contains(PeerId::new(42)));
    }

    #[tokio::test]
    async fn superseded_connection_does_not_release_successor() {
        let h = harness(true);
        let (tx, _rx) = mpsc::channel(4);
        let successor = Arc::new(PeerConnection::new(tx));
        let _ = h.registry.bind(PeerId::new(42), successor.clone());
        assert!(h.conn.is_closed());

        let mut frames = stream::pending::<String>();
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        let bound = h.registry.get(PeerId::new(42)).unwrap();
        assert_eq!(bound.id(), successor.id());
    }

    #[tokio::test]
    async fn responses_resolve_pending_calls() {
        let h = harness(false);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
        let mut frames = tokio_stream_from(frame_rx);

        let correlator = h.correlator.clone();
        let call = tokio::spawn(async move { correlator.call(PeerId::new(42), "get_status", Map::new(), None).await });
        while h.correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let mut outbound = h.outbound;
        let request: serde_json::Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
        let echo: Echo = request["echo"].as_str().unwrap().parse().unwrap();

        let reply = serde_json::to_string(&OneBotResponse::ok(echo, None)).unwrap();
        frame_tx.send(reply).unwrap();
        drop(frame_tx);

        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert!(call.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn abandon_policy_fails_in_flight_calls() {
        let h = harness(true);
        let correlator = h.correlator.clone();
        let call = tokio::spawn(async move { correlator.call(PeerId::new(42), "get_status", Map::new(), None).await });
        while h.correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let mut frames = stream::iter(Vec::<String>::new());
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert!(call.await.unwrap().is_none());
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn abandon_policy_applies_after_explicit_disconnect() {
        let h = harness(true);
        let correlator = h.correlator.clone();
        let call = tokio::spawn(async move { correlator.call(PeerId::new(42), "get_status", Map::new(), None).await });
        while h.correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(h.registry.disconnect(PeerId::new(42)));
        let mut frames = stream::pending::<String>();
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert!(call.await.unwrap().is_none());
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn abandon_policy_applies_after_eviction() {
        let h = harness(true);
        let correlator = h.correlator.clone();
        let call = tokio::spawn(async move { correlator.call(PeerId::new(42), "get_status", Map::new(), None).await });
        while h.correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        drop(h.outbound);
        assert!(!h.registry.send(PeerId::new(42), Arc::new("x".to_string())));
        assert!(!h.registry.contains(PeerId::new(42)));
        let mut frames = stream::pending::<String>();
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert!(call.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn superseded_connection_keeps_successor_calls() {
        let h = harness(true);
        let (tx, _rx) = mpsc::channel(4);
        let _ = h.registry.bind(PeerId::new(42), Arc::new(PeerConnection::new(tx)));
        let correlator = h.correlator.clone();
        let call = tokio::spawn(async move { correlator.call(PeerId::new(42), "get_status", Map::new(), None).await });
        while h.correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let mut frames = stream::pending::<String>();
        let _ = h.inbound.run(PeerId::new(42), &h.conn, &mut frames).await;
        assert_eq!(h.correlator.pending_count(), 1);
        call.abort();
    }

    #[tokio::test]
    async fn deliver_reaches_handlers_and_refreshes_liveness() {
        let mut h = harness(false);
        let event = match parse(&heartbeat(42)).unwrap() {
            InboundFrame::Event(event) => event,
            InboundFrame::Response(_) => unreachable!(),
        };
        let _ = h.conn.check_alive();

        assert!(h.inbound.deliver(PeerId::new(42), &h.conn, event));
        assert!(h.conn.check_alive());
        assert_eq!(h.events.recv().await.unwrap().kind(), EventKind::Heartbeat);
    }

    fn tokio_stream_from(mut rx: mpsc::UnboundedReceiver<String>) -> impl Stream<Item = String> + Unpin {
        Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }
}
