//! Correlated action request/response pair.
//!
//! Outbound calls are `{action, params, echo}`; the bot runtime answers on the
//! same connection with `{status, retcode, data, message, wording, echo}`.
//! The `echo` UUID is the only join key between the two.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::ids::Echo;
use crate::parse::Obj;

/// An action invocation sent to a bot runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OneBotRequest {
    /// Action name (`send_private_msg`, ...).
    pub action: String,
    /// Action arguments.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Correlation id.
    pub echo: Echo,
}

impl OneBotRequest {
    /// Build a request.
    pub fn new(action: impl Into<String>, params: Map<String, Value>, echo: Echo) -> Self {
        Self {
            action: action.into(),
            params,
            echo,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outcome flag of a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Action succeeded.
    Ok,
    /// Action failed; see `retcode` and `message`.
    Failed,
}

/// A bot runtime's reply to a [`OneBotRequest`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OneBotResponse {
    /// Outcome.
    pub status: ResponseStatus,
    /// Runtime result code (`0` on success).
    #[serde(rename = "retcode")]
    pub result_code: i64,
    /// Action-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error message.
    pub message: String,
    /// Human-readable error description.
    pub wording: String,
    /// Correlation id copied from the request.
    #[serde(rename = "echo")]
    pub correlation_id: Echo,
}

impl OneBotResponse {
    /// A successful response with optional data.
    pub fn ok(correlation_id: Echo, data: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            result_code: 0,
            data,
            message: String::new(),
            wording: String::new(),
            correlation_id,
        }
    }

    /// Whether `status` is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub(crate) fn from_obj(obj: &Obj<'_>) -> Result<Self, ValidationError> {
        let status = match obj.tag("status", &["ok", "failed"])? {
            "ok" => ResponseStatus::Ok,
            _ => ResponseStatus::Failed,
        };
        let raw_echo = obj.str("echo")?;
        let correlation_id = raw_echo
            .parse::<Echo>()
            .map_err(|e| ValidationError::invalid(obj.path_of("echo"), format!("echo is not a UUID: {e}")))?;

        Ok(Self {
            status,
            result_code: obj.i64("retcode")?,
            data: obj.any("data").cloned(),
            message: obj.opt_str("message")?.unwrap_or_default().to_owned(),
            wording: obj.opt_str("wording")?.unwrap_or_default().to_owned(),
            correlation_id,
        })
    }
}
