//! Typed inbound events.
//!
//! The wire format is a tagged union nested three levels deep:
//! `post_type` → `meta_event_type` / `message_type` → `sub_type`. Each level
//! is a closed enum here, and serializing any value reproduces the wire shape
//! the parser accepts.

mod message;
mod meta;
mod segment;

use std::fmt;

use serde::Serialize;

pub use message::{GroupMessage, MessageBody, MessageEvent, MessageFormat, PrivateMessage, Sender};
pub use meta::{HeartbeatEvent, HeartbeatStatus, LifecycleEvent, MetaEvent, MetaHeader};
pub use segment::{
    AtData, AtTarget, FileData, IdData, ImageData, ImageKind, MessageSegment, TextData, VideoData,
};

use crate::errors::ValidationError;
use crate::ids::PeerId;
use crate::parse::Obj;

/// Any event pushed by a bot runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum Event {
    /// `post_type = "meta_event"`.
    MetaEvent(MetaEvent),
    /// `post_type = "message"`.
    Message(MessageEvent),
}

/// Flat classification of [`Event`] used to key handler tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Lifecycle `connect`.
    Connect,
    /// Meta `heartbeat`.
    Heartbeat,
    /// Private message.
    PrivateMessage,
    /// Group message.
    GroupMessage,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Connect,
        Self::Heartbeat,
        Self::PrivateMessage,
        Self::GroupMessage,
    ];

    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Heartbeat => "heartbeat",
            Self::PrivateMessage => "private_message",
            Self::GroupMessage => "group_message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Unix timestamp of the event.
    pub fn time(&self) -> i64 {
        match self {
            Self::MetaEvent(meta) => meta.header().time,
            Self::Message(msg) => msg.body().time,
        }
    }

    /// Identity of the bot that produced the event.
    pub fn self_id(&self) -> PeerId {
        match self {
            Self::MetaEvent(meta) => meta.header().self_id,
            Self::Message(msg) => msg.body().self_id,
        }
    }

    /// Flat classification.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MetaEvent(MetaEvent::Lifecycle(LifecycleEvent::Connect(_))) => EventKind::Connect,
            Self::MetaEvent(MetaEvent::Heartbeat(_)) => EventKind::Heartbeat,
            Self::Message(MessageEvent::Private(_)) => EventKind::PrivateMessage,
            Self::Message(MessageEvent::Group(_)) => EventKind::GroupMessage,
        }
    }

    /// Whether this is the lifecycle `connect` announcement.
    pub fn is_connect(&self) -> bool {
        self.kind() == EventKind::Connect
    }

    pub(crate) fn from_obj(obj: &Obj<'_>, now: i64) -> Result<Self, ValidationError> {
        match obj.tag("post_type", &["meta_event", "message"])? {
            "meta_event" => MetaEvent::from_obj(obj, now).map(Self::MetaEvent),
            _ => MessageEvent::from_obj(obj, now).map(Self::Message),
        }
    }
}
