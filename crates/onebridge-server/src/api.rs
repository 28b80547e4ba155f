//! Typed bot actions on top of the correlator.

use std::sync::Arc;
use std::time::Duration;

use onebridge_core::{MessageSegment, OneBotResponse, PeerId};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::correlator::Correlator;

/// Handle for issuing actions to connected bots. Cheap to clone.
#[derive(Clone)]
pub struct BotApi {
    correlator: Arc<Correlator>,
}

impl BotApi {
    /// Wrap a correlator.
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    /// Raw correlated call.
    pub async fn call(
        &self,
        peer: PeerId,
        action: &str,
        params: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Option<OneBotResponse> {
        self.correlator.call(peer, action, params, timeout).await
    }

    /// Send a private message to `user_id` through `peer`.
    pub async fn send_private_msg(
        &self,
        peer: PeerId,
        user_id: i64,
        message: Vec<MessageSegment>,
        timeout: Option<Duration>,
    ) -> Option<OneBotResponse> {
        let params = message_params("user_id", user_id, &message)?;
        self.call(peer, "send_private_msg", params, timeout).await
    }

    /// Send a message to group `group_id` through `peer`.
    pub async fn send_group_msg(
        &self,
        peer: PeerId,
        group_id: i64,
        message: Vec<MessageSegment>,
        timeout: Option<Duration>,
    ) -> Option<OneBotResponse> {
        let params = message_params("group_id", group_id, &message)?;
        self.call(peer, "send_group_msg", params, timeout).await
    }
}

fn message_params(target_key: &str, target: i64, message: &[MessageSegment]) -> Option<Map<String, Value>> {
    let segments = match serde_json::to_value(message) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "failed to encode message segments");
            return None;
        }
    };
    let mut params = Map::new();
    let _ = params.insert(target_key.to_owned(), json!(target));
    let _ = params.insert("message".to_owned(), segments);
    Some(params)
}
