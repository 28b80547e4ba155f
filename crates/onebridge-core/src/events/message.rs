//! `post_type = "message"`: private and group chat messages.

use serde::Serialize;

use super::segment::MessageSegment;
use crate::errors::ValidationError;
use crate::ids::PeerId;
use crate::parse::{Obj, check_time};

/// A chat message, discriminated by `message_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// One-to-one message.
    Private(PrivateMessage),
    /// Group chat message.
    Group(GroupMessage),
}

/// `message_type = "private"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrivateMessage {
    /// Common message fields.
    #[serde(flatten)]
    pub body: MessageBody,
    /// Recipient user id.
    pub target_id: i64,
}

/// `message_type = "group"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupMessage {
    /// Common message fields.
    #[serde(flatten)]
    pub body: MessageBody,
    /// Group the message was posted in.
    pub group_id: i64,
}

/// Fields shared by private and group messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageBody {
    /// Unix seconds.
    pub time: i64,
    /// Receiving bot identity.
    pub self_id: PeerId,
    /// Sender id.
    pub user_id: i64,
    /// Runtime-assigned message id.
    pub message_id: i64,
    /// CQ-code rendering of the message.
    pub raw_message: String,
    /// Ordered segments.
    pub message: Vec<MessageSegment>,
    /// Always `"array"`.
    pub message_format: MessageFormat,
    /// Runtime-specific sub type (`friend`, `normal`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    /// Sender profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Sender>,
}

/// Segment encoding of `message`. Only the array form is accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Segment array.
    #[default]
    Array,
}

/// Sender profile attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Sender {
    /// Sender id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Group card (group messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    /// Group role (group messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl MessageEvent {
    /// Common fields.
    pub fn body(&self) -> &MessageBody {
        match self {
            Self::Private(m) => &m.body,
            Self::Group(m) => &m.body,
        }
    }

    pub(crate) fn from_obj(obj: &Obj<'_>, now: i64) -> Result<Self, ValidationError> {
        match obj.tag("message_type", &["private", "group"])? {
            "private" => Ok(Self::Private(PrivateMessage {
                body: MessageBody::from_obj(obj, now)?,
                target_id: obj.i64("target_id")?,
            })),
            _ => Ok(Self::Group(GroupMessage {
                body: MessageBody::from_obj(obj, now)?,
                group_id: obj.i64("group_id")?,
            })),
        }
    }
}

impl MessageBody {
    /// Concatenation of all text segments.
    pub fn plain_text(&self) -> String {
        self.message
            .iter()
            .filter_map(|seg| match seg {
                MessageSegment::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn from_obj(obj: &Obj<'_>, now: i64) -> Result<Self, ValidationError> {
        let time = check_time(obj, now)?;
        let self_id = PeerId::new(obj.i64("self_id")?);
        let user_id = obj.i64("user_id")?;
        let message_id = obj.i64("message_id")?;
        let raw_message = obj.str("raw_message")?.to_owned();
        let message = obj
            .array("message")?
            .into_iter()
            .map(|(path, item)| MessageSegment::from_value(item, path))
            .collect::<Result<Vec<_>, _>>()?;
        let _ = obj.tag("message_format", &["array"])?;
        let sub_type = obj.opt_str("sub_type")?.map(str::to_owned);
        let sender = if obj.has("sender") {
            Some(Sender::from_obj(&obj.object("sender")?)?)
        } else {
            None
        };

        Ok(Self {
            time,
            self_id,
            user_id,
            message_id,
            raw_message,
            message,
            message_format: MessageFormat::Array,
            sub_type,
            sender,
        })
    }
}

impl Sender {
    fn from_obj(obj: &Obj<'_>) -> Result<Self, ValidationError> {
        Ok(Self {
            user_id: obj.opt_i64("user_id")?,
            nickname: obj.opt_str("nickname")?.map(str::to_owned),
            card: obj.opt_str("card")?.map(str::to_owned),
            role: obj.opt_str("role")?.map(str::to_owned),
        })
    }
}
