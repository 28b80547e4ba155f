//! `post_type = "meta_event"`: lifecycle and heartbeat.

use serde::Serialize;

use crate::errors::ValidationError;
use crate::ids::PeerId;
use crate::parse::{Obj, check_time};

/// A meta event, discriminated by `meta_event_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "meta_event_type", rename_all = "snake_case")]
pub enum MetaEvent {
    /// Connection lifecycle notification.
    Lifecycle(LifecycleEvent),
    /// Periodic liveness report.
    Heartbeat(HeartbeatEvent),
}

/// Lifecycle event, discriminated by `sub_type`. Only `connect` is modelled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Sent by the bot runtime as the first frame on a new connection.
    Connect(MetaHeader),
}

/// Fields shared by every event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MetaHeader {
    /// Unix seconds.
    pub time: i64,
    /// Reporting bot identity.
    pub self_id: PeerId,
}

/// `meta_event_type = "heartbeat"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HeartbeatEvent {
    /// Unix seconds.
    pub time: i64,
    /// Reporting bot identity.
    pub self_id: PeerId,
    /// Runtime health.
    pub status: HeartbeatStatus,
    /// Interval until the next heartbeat, in milliseconds.
    pub interval: i64,
}

/// Health flags carried by a heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HeartbeatStatus {
    /// Logged in to the chat service.
    pub online: bool,
    /// Runtime is working normally.
    pub good: bool,
}

impl MetaHeader {
    pub(crate) fn from_obj(obj: &Obj<'_>, now: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            time: check_time(obj, now)?,
            self_id: PeerId::new(obj.i64("self_id")?),
        })
    }
}

impl MetaEvent {
    /// Shared header.
    pub fn header(&self) -> MetaHeader {
        match self {
            Self::Lifecycle(LifecycleEvent::Connect(header)) => *header,
            Self::Heartbeat(hb) => MetaHeader {
                time: hb.time,
                self_id: hb.self_id,
            },
        }
    }

    pub(crate) fn from_obj(obj: &Obj<'_>, now: i64) -> Result<Self, ValidationError> {
        match obj.tag("meta_event_type", &["lifecycle", "heartbeat"])? {
            "lifecycle" => {
                let _ = obj.tag("sub_type", &["connect"])?;
                Ok(Self::Lifecycle(LifecycleEvent::Connect(MetaHeader::from_obj(obj, now)?)))
            }
            _ => {
                let header = MetaHeader::from_obj(obj, now)?;
                let status = obj.object("status")?;
                Ok(Self::Heartbeat(HeartbeatEvent {
                    time: header.time,
                    self_id: header.self_id,
                    status: HeartbeatStatus {
                        online: status.bool("online")?,
                        good: status.bool("good")?,
                    },
                    interval: obj.i64("interval")?,
                }))
            }
        }
    }
}
