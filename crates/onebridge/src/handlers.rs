//! Handlers installed by the binary.

use async_trait::async_trait;
use onebridge_core::events::MessageEvent;
use onebridge_core::{Event, EventKind};
use onebridge_server::{EventHandler, HandlerContext, HandlerError, HandlerTable};
use tracing::{debug, info};

/// Logs every event it sees.
pub struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        match event {
            Event::Message(MessageEvent::Private(pm)) => {
                info!(peer = %ctx.peer, user_id = pm.body.user_id, text = %pm.body.plain_text(), "private message");
            }
            Event::Message(MessageEvent::Group(gm)) => {
                info!(
                    peer = %ctx.peer,
                    group_id = gm.group_id,
                    user_id = gm.body.user_id,
                    text = %gm.body.plain_text(),
                    "group message"
                );
            }
            Event::MetaEvent(_) if event.is_connect() => info!(peer = %ctx.peer, "bot announced connect"),
            Event::MetaEvent(_) => debug!(peer = %ctx.peer, "heartbeat"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "event_logger"
    }
}

/// Table with [`EventLogger`] on every event kind.
pub fn default_table() -> HandlerTable {
    EventKind::ALL
        .into_iter()
        .fold(HandlerTable::new(), |table, kind| table.with(kind, EventLogger))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use onebridge_core::logging::capture_logs;
    use onebridge_core::{PeerId, parse_event_at};
    use onebridge_server::{BotApi, ConnectionRegistry, Correlator};
    use tracing::Level;

    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn ctx() -> HandlerContext {
        let registry = Arc::new(ConnectionRegistry::new());
        HandlerContext {
            peer: PeerId::new(42),
            api: BotApi::new(Arc::new(Correlator::new(registry, Duration::from_secs(1)))),
        }
    }

    #[test]
    fn default_table_covers_every_kind() {
        let table = default_table();
        for kind in EventKind::ALL {
            assert_eq!(table.handlers_for(kind).len(), 1, "{kind}");
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn logs_group_message_text() {
        let (logs, _guard) = capture_logs();
        let raw = serde_json::json!({
            "time": NOW,
            "self_id": 42,
            "user_id": 7,
            "message_id": 1,
            "raw_message": "hi all",
            "message": [{"type": "text", "data": {"text": "hi all"}}],
            "message_format": "array",
            "post_type": "message",
            "message_type": "group",
            "group_id": 900
        });
        let event = parse_event_at(&raw.to_string(), NOW).unwrap();

        EventLogger.handle(&ctx(), &event).await.unwrap();
        assert!(logs.has_event(Level::INFO, "group message"));
        let logged = logs.events().into_iter().find(|e| e.message == "group message").unwrap();
        assert_eq!(logged.field("group_id"), Some("900"));
    }
}
