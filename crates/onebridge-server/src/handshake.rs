//! Bounded first-frame handshake.
//!
//! A new connection must send one text frame within the handshake window.
//! The frame must be a valid event; its `self_id` becomes the peer identity.
//! Anything other than a lifecycle `connect` is accepted with a warning,
//! since some runtimes open with a heartbeat.

use std::time::Duration;

use futures::{Stream, StreamExt};
use onebridge_core::{Event, InboundFrame, ParseError, ValidationError, parse};
use thiserror::Error;
use tracing::warn;

/// Why a connection failed its handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No frame arrived within the window.
    #[error("no handshake frame within {0:?}")]
    Timeout(Duration),
    /// The transport ended before the first frame.
    #[error("connection closed before handshake")]
    Closed,
    /// The first frame was not a JSON object.
    #[error("malformed handshake frame: {0}")]
    Malformed(String),
    /// The first frame was JSON but not a valid event.
    #[error("invalid handshake frame: {0}")]
    Invalid(ValidationError),
}

impl HandshakeError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Closed => "closed",
            Self::Malformed(_) => "malformed",
            Self::Invalid(_) => "invalid",
        }
    }
}

impl From<ParseError> for HandshakeError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedPayload(message) => Self::Malformed(message),
            ParseError::Validation(inner) => Self::Invalid(inner),
        }
    }
}

/// Wait for and validate the first frame on `frames`.
pub async fn await_handshake<S>(frames: &mut S, window: Duration) -> Result<Event, HandshakeError>
where
    S: Stream<Item = String> + Unpin,
{
    let text = tokio::time::timeout(window, frames.next())
        .await
        .map_err(|_| HandshakeError::Timeout(window))?
        .ok_or(HandshakeError::Closed)?;

    let event = match parse(&text)? {
        InboundFrame::Event(event) => event,
        InboundFrame::Response(_) => {
            return Err(HandshakeError::Invalid(ValidationError::missing("post_type")));
        }
    };

    if !event.is_connect() {
        warn!(
            peer = %event.self_id(),
            kind = %event.kind(),
            "first frame is not a lifecycle connect event, binding anyway"
        );
    }
    Ok(event)
}
