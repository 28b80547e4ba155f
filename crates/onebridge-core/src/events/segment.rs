//! Message segments (`{"type": ..., "data": {...}}`).

use serde::{Serialize, Serializer};
use serde_json::Value;
use url::Url;

use crate::errors::ValidationError;
use crate::parse::Obj;

/// One element of a message's segment array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageSegment {
    /// Plain text.
    Text(TextData),
    /// Quote of an earlier message.
    Reply(IdData),
    /// Picture or meme.
    Image(ImageData),
    /// Video clip.
    Video(VideoData),
    /// Uploaded file.
    File(FileData),
    /// Mention of a user or everyone.
    At(AtData),
    /// Merged-forward bundle.
    Forward(IdData),
}

const SEGMENT_TYPES: &[&str] = &["text", "reply", "image", "video", "file", "at", "forward"];

/// Payload of a `text` segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextData {
    /// The text.
    pub text: String,
}

/// Payload of `reply` and `forward` segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IdData {
    /// Referenced message or bundle id.
    pub id: i64,
}

/// Payload of an `image` segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageData {
    /// File name or identifier on the bot runtime.
    pub file: String,
    /// Picture flavour.
    pub sub_type: ImageKind,
    /// Download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

/// `image.sub_type`: `0` normal picture, `1` meme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageKind {
    /// Regular picture.
    #[default]
    Normal,
    /// Sticker or meme.
    Meme,
}

impl ImageKind {
    fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Meme => 1,
        }
    }
}

impl Serialize for ImageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Payload of a `video` segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VideoData {
    /// File name or identifier.
    pub file: String,
    /// Download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

/// Payload of a `file` segment. Private chats carry no URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileData {
    /// File name.
    pub file: String,
    /// Runtime-side file id.
    pub file_id: String,
    /// Download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

/// Payload of an `at` segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AtData {
    /// Who is mentioned.
    pub qq: AtTarget,
}

/// Mention target: a single user or the whole group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtTarget {
    /// `"all"`.
    All,
    /// A user id.
    User(i64),
}

impl Serialize for AtTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::User(id) => serializer.serialize_str(&id.to_string()),
        }
    }
}

impl MessageSegment {
    /// Convenience constructor for a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextData { text: text.into() })
    }

    /// Convenience constructor for a mention.
    pub fn at(target: AtTarget) -> Self {
        Self::At(AtData { qq: target })
    }

    /// Convenience constructor for a reply quote.
    pub fn reply(message_id: i64) -> Self {
        Self::Reply(IdData { id: message_id })
    }

    /// Wire name of this segment's `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Reply(_) => "reply",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::File(_) => "file",
            Self::At(_) => "at",
            Self::Forward(_) => "forward",
        }
    }

    pub(crate) fn from_value(value: &Value, path: String) -> Result<Self, ValidationError> {
        let seg = Obj::at(value, path)?;
        let kind = seg.tag("type", SEGMENT_TYPES)?;
        let data = seg.object("data")?;

        let segment = match kind {
            "text" => Self::Text(TextData {
                text: data.str("text")?.to_owned(),
            }),
            "reply" => Self::Reply(IdData { id: data.id("id")? }),
            "forward" => Self::Forward(IdData { id: data.id("id")? }),
            "image" => Self::Image(ImageData {
                file: data.str("file")?.to_owned(),
                sub_type: image_kind(&data)?,
                url: data.opt_http_url("url")?,
                file_size: data.opt_id("file_size")?,
            }),
            "video" => Self::Video(VideoData {
                file: data.str("file")?.to_owned(),
                url: data.opt_http_url("url")?,
            }),
            "file" => Self::File(FileData {
                file: data.str("file")?.to_owned(),
                file_id: data.str("file_id")?.to_owned(),
                url: data.opt_http_url("url")?,
            }),
            "at" => Self::At(AtData {
                qq: at_target(&data)?,
            }),
            other => {
                return Err(ValidationError::unknown_variant(
                    seg.path_of("type"),
                    other,
                    SEGMENT_TYPES,
                ));
            }
        };
        Ok(segment)
    }
}

fn image_kind(data: &Obj<'_>) -> Result<ImageKind, ValidationError> {
    match data.opt_id("sub_type")? {
        None | Some(0) => Ok(ImageKind::Normal),
        Some(1) => Ok(ImageKind::Meme),
        Some(other) => Err(ValidationError::invalid(
            data.path_of("sub_type"),
            format!("image sub_type must be 0 or 1, got {other}"),
        )),
    }
}

fn at_target(data: &Obj<'_>) -> Result<AtTarget, ValidationError> {
    if data.any("qq").and_then(Value::as_str) == Some("all") {
        return Ok(AtTarget::All);
    }
    data.id("qq").map(AtTarget::User)
}
