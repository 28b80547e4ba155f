//! Inbound frame decoding.
//!
//! Every text frame is first decoded as generic JSON, then classified:
//! objects carrying `post_type` are events, objects carrying only `echo` are
//! correlated responses. Schema checks walk the JSON tree through [`Obj`],
//! which tracks the dotted path so a failure names the exact field
//! (`message[1].data.id`).

use serde_json::{Map, Value};

use crate::action::OneBotResponse;
use crate::errors::{ParseError, ValidationError};
use crate::events::Event;

/// Allowed clock skew for event timestamps, in seconds.
pub const MAX_CLOCK_SKEW_SECS: i64 = 86_400;

/// One decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// A pushed event (`post_type` present).
    Event(Event),
    /// A reply to an earlier correlated request (`echo` present).
    Response(OneBotResponse),
}

impl InboundFrame {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Event(event) => event.kind().as_str(),
            Self::Response(_) => "response",
        }
    }
}

/// Decode a frame using the wall clock for timestamp validation.
pub fn parse(text: &str) -> Result<InboundFrame, ParseError> {
    parse_at(text, chrono::Utc::now().timestamp())
}

/// Decode a frame against an explicit `now` (unix seconds).
pub fn parse_at(text: &str, now: i64) -> Result<InboundFrame, ParseError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = value else {
        return Err(ParseError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    };
    let root = Obj::root(&map);

    if root.has("post_type") {
        return Ok(InboundFrame::Event(Event::from_obj(&root, now)?));
    }
    if root.has("echo") {
        return Ok(InboundFrame::Response(OneBotResponse::from_obj(&root)?));
    }
    Err(ValidationError::missing("post_type").into())
}

/// Validate a frame as an event only, rejecting responses.
pub fn parse_event_at(text: &str, now: i64) -> Result<Event, ParseError> {
    match parse_at(text, now)? {
        InboundFrame::Event(event) => Ok(event),
        InboundFrame::Response(_) => Err(ValidationError::missing("post_type").into()),
    }
}

pub(crate) fn check_time(obj: &Obj<'_>, now: i64) -> Result<i64, ValidationError> {
    let time = obj.i64("time")?;
    if time <= 0 {
        return Err(ValidationError::invalid(
            obj.path_of("time"),
            "timestamp must be positive",
        ));
    }
    if time > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
        return Err(ValidationError::invalid(
            obj.path_of("time"),
            "timestamp is more than one day ahead of the local clock",
        ));
    }
    Ok(time)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A JSON object paired with its path from the frame root.
pub(crate) struct Obj<'a> {
    map: &'a Map<String, Value>,
    path: String,
}

impl<'a> Obj<'a> {
    pub(crate) fn root(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            path: String::new(),
        }
    }

    /// Interpret `value` as an object found at `path`.
    pub(crate) fn at(value: &'a Value, path: String) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self { map, path }),
            _ => Err(ValidationError::wrong_type(path, "object")),
        }
    }

    pub(crate) fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    /// Present and not `null`.
    pub(crate) fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn req(&self, key: &str) -> Result<&'a Value, ValidationError> {
        self.get(key)
            .ok_or_else(|| ValidationError::missing(self.path_of(key)))
    }

    pub(crate) fn any(&self, key: &str) -> Option<&'a Value> {
        self.get(key)
    }

    pub(crate) fn i64(&self, key: &str) -> Result<i64, ValidationError> {
        as_i64(self.req(key)?).ok_or_else(|| ValidationError::wrong_type(self.path_of(key), "integer"))
    }

    pub(crate) fn bool(&self, key: &str) -> Result<bool, ValidationError> {
        self.req(key)?
            .as_bool()
            .ok_or_else(|| ValidationError::wrong_type(self.path_of(key), "boolean"))
    }

    pub(crate) fn str(&self, key: &str) -> Result<&'a str, ValidationError> {
        self.req(key)?
            .as_str()
            .ok_or_else(|| ValidationError::wrong_type(self.path_of(key), "string"))
    }

    pub(crate) fn opt_str(&self, key: &str) -> Result<Option<&'a str>, ValidationError> {
        if self.has(key) { self.str(key).map(Some) } else { Ok(None) }
    }

    pub(crate) fn opt_i64(&self, key: &str) -> Result<Option<i64>, ValidationError> {
        if self.has(key) { self.i64(key).map(Some) } else { Ok(None) }
    }

    pub(crate) fn object(&self, key: &str) -> Result<Obj<'a>, ValidationError> {
        Obj::at(self.req(key)?, self.path_of(key))
    }

    /// Array elements paired with their indexed paths.
    pub(crate) fn array(&self, key: &str) -> Result<Vec<(String, &'a Value)>, ValidationError> {
        let path = self.path_of(key);
        let items = self
            .req(key)?
            .as_array()
            .ok_or_else(|| ValidationError::wrong_type(path.clone(), "array"))?;
        Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("{path}[{i}]"), item))
            .collect())
    }

    /// An integer id, also accepting a string of decimal digits.
    pub(crate) fn id(&self, key: &str) -> Result<i64, ValidationError> {
        let value = self.req(key)?;
        coerce_id(value).ok_or_else(|| ValidationError::wrong_type(self.path_of(key), "integer or numeric string"))
    }

    pub(crate) fn opt_id(&self, key: &str) -> Result<Option<i64>, ValidationError> {
        if self.has(key) { self.id(key).map(Some) } else { Ok(None) }
    }

    /// A string discriminator restricted to `allowed`.
    pub(crate) fn tag(
        &self,
        key: &str,
        allowed: &'static [&'static str],
    ) -> Result<&'a str, ValidationError> {
        let found = self.str(key)?;
        if allowed.contains(&found) {
            Ok(found)
        } else {
            Err(ValidationError::unknown_variant(self.path_of(key), found, allowed))
        }
    }

    /// An optional `http`/`https` URL.
    pub(crate) fn opt_http_url(&self, key: &str) -> Result<Option<url::Url>, ValidationError> {
        let Some(raw) = self.opt_str(key)? else {
            return Ok(None);
        };
        let parsed = url::Url::parse(raw)
            .map_err(|e| ValidationError::invalid(self.path_of(key), format!("invalid url: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Some(parsed)),
            other => Err(ValidationError::invalid(
                self.path_of(key),
                format!("url scheme must be http or https, got `{other}`"),
            )),
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

pub(crate) fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
                return None;
            }
            trimmed.parse().ok()
        }
        _ => None,
    }
}
