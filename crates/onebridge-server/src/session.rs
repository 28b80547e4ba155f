//! One WebSocket peer from upgrade to teardown.
//!
//! The socket is split: a writer task drains the connection's outbound queue
//! and pings on an interval, while the session task runs the handshake and
//! then the inbound loop on the read half.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, stream};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::connection::PeerConnection;
use crate::inbound::InboundLoop;
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::registry::ConnectionRegistry;

/// How long teardown waits for the writer to flush its close frame.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Inbound text frames of one transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Everything a session needs, cloned per upgrade.
#[derive(Clone)]
pub struct SessionContext {
    /// Peer bindings.
    pub registry: Arc<ConnectionRegistry>,
    /// Post-handshake router.
    pub inbound: InboundLoop,
    /// First-frame deadline.
    pub handshake_timeout: Duration,
    /// Outbound queue bound per connection.
    pub send_queue_capacity: usize,
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence after which the peer is dropped.
    pub pong_timeout: Duration,
}

impl SessionContext {
    /// Context using the limits in `config`.
    pub fn new(config: &ServerConfig, registry: Arc<ConnectionRegistry>, inbound: InboundLoop) -> Self {
        Self {
            registry,
            inbound,
            handshake_timeout: config.handshake_timeout(),
            send_queue_capacity: config.send_queue_capacity,
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// Drive one upgraded socket until it closes.
#[instrument(skip_all, fields(conn_id = tracing::field::Empty))]
pub async fn run_peer_session(socket: WebSocket, ctx: SessionContext) {
    let (sink, source) = socket.split();
    let (tx, rx) = mpsc::channel(ctx.send_queue_capacity.max(1));
    let conn = Arc::new(PeerConnection::new(tx));
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(conn.id()));

    debug!("transport opened");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    let started = Instant::now();

    let mut writer = tokio::spawn(run_writer(sink, rx, conn.clone(), ctx.ping_interval, ctx.pong_timeout));
    let mut frames = frame_stream(source, conn.clone());

    if let Ok((peer, hello)) = ctx.registry.accept(conn.clone(), &mut frames, ctx.handshake_timeout).await {
        let _ = ctx.inbound.deliver(peer, &conn, hello);
        let processed = ctx.inbound.run(peer, &conn, &mut frames).await;
        info!(%peer, frames = processed, dropped = conn.drop_count(), "peer session ended");
    }

    conn.close();
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Adapt a WebSocket read half into a stream of text payloads.
///
/// Binary frames holding UTF-8 count as text. Pings and pongs refresh
/// liveness. The stream ends on close, transport error, or end of input.
pub fn frame_stream<S, E>(source: S, conn: Arc<PeerConnection>) -> FrameStream
where
    S: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
{
    Box::pin(stream::unfold((source, conn), |(mut source, conn)| async move {
        loop {
            let message = match source.next().await? {
                Ok(message) => message,
                Err(err) => {
                    debug!(error = %err, "transport read failed");
                    return None;
                }
            };
            match message {
                Message::Text(text) => return Some((text.to_string(), (source, conn))),
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => return Some((text.to_owned(), (source, conn))),
                    Err(_) => debug!(len = data.len(), "dropping non-UTF-8 binary frame"),
                },
                Message::Ping(_) | Message::Pong(_) => conn.mark_alive(),
                Message::Close(frame) => {
                    debug!(?frame, "peer sent close");
                    return None;
                }
            }
        }
    }))
}

/// Forward queued frames to `sink` and ping every `ping_interval`.
///
/// Exits when the connection is closed, the queue's senders are gone, the
/// sink fails, or the peer stays silent past `pong_timeout`. Always closes
/// the connection on the way out.
pub async fn run_writer<K>(
    mut sink: K,
    mut rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<PeerConnection>,
    ping_interval: Duration,
    pong_timeout: Duration,
) where
    K: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval(ping_interval);
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = conn.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            queued = rx.recv() => {
                let Some(text) = queued else { break };
                if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                    debug!("sink rejected frame");
                    break;
                }
            }
            _ = ticker.tick() => {
                if !conn.check_alive() && conn.last_seen_elapsed() > pong_timeout {
                    warn!(conn_id = %conn.id(), ?pong_timeout, "peer unresponsive, disconnecting");
                    break;
                }
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    conn.close();
}
