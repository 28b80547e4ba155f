//! Property: every well-formed event survives serialize → parse unchanged.

use onebridge_core::events::{
    AtTarget, FileData, GroupMessage, HeartbeatEvent, HeartbeatStatus, IdData, ImageData,
    ImageKind, LifecycleEvent, MessageBody, MessageEvent, MessageFormat, MetaEvent, MetaHeader,
    PrivateMessage, Sender, TextData, VideoData,
};
use onebridge_core::{Event, InboundFrame, MessageSegment, PeerId, parse_at};
use proptest::prelude::*;
use url::Url;

const NOW: i64 = 1_700_000_000;

fn time() -> impl Strategy<Value = i64> {
    1..=NOW + 86_400
}

fn url() -> impl Strategy<Value = Option<Url>> {
    prop::option::of(
        prop::sample::select(vec![
            "https://multimedia.nt.qq.com.cn/download?appid=1407",
            "http://127.0.0.1:8080/files/a.png",
            "https://example.com/",
        ])
        .prop_map(|s| Url::parse(s).unwrap()),
    )
}

fn segment() -> impl Strategy<Value = MessageSegment> {
    prop_oneof![
        any::<String>().prop_map(|text| MessageSegment::Text(TextData { text })),
        any::<i64>().prop_map(|id| MessageSegment::Reply(IdData { id })),
        any::<i64>().prop_map(|id| MessageSegment::Forward(IdData { id })),
        (any::<String>(), any::<bool>(), url(), prop::option::of(0i64..1 << 40)).prop_map(
            |(file, meme, url, file_size)| MessageSegment::Image(ImageData {
                file,
                sub_type: if meme { ImageKind::Meme } else { ImageKind::Normal },
                url,
                file_size,
            })
        ),
        (any::<String>(), url()).prop_map(|(file, url)| MessageSegment::Video(VideoData { file, url })),
        (any::<String>(), any::<String>(), url())
            .prop_map(|(file, file_id, url)| MessageSegment::File(FileData { file, file_id, url })),
        prop_oneof![Just(AtTarget::All), any::<i64>().prop_map(AtTarget::User)]
            .prop_map(MessageSegment::at),
    ]
}

fn sender() -> impl Strategy<Value = Option<Sender>> {
    prop::option::of(
        (
            prop::option::of(any::<i64>()),
            prop::option::of(any::<String>()),
            prop::option::of(any::<String>()),
            prop::option::of(prop::sample::select(vec!["owner", "admin", "member"])),
        )
            .prop_map(|(user_id, nickname, card, role)| Sender {
                user_id,
                nickname,
                card,
                role: role.map(str::to_owned),
            }),
    )
}

fn body() -> impl Strategy<Value = MessageBody> {
    (
        time(),
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        any::<String>(),
        prop::collection::vec(segment(), 0..6),
        prop::option::of("[a-z]{1,8}"),
        sender(),
    )
        .prop_map(
            |(time, self_id, user_id, message_id, raw_message, message, sub_type, sender)| MessageBody {
                time,
                self_id: PeerId::new(self_id),
                user_id,
                message_id,
                raw_message,
                message,
                message_format: MessageFormat::Array,
                sub_type,
                sender,
            },
        )
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (time(), any::<i64>()).prop_map(|(time, id)| Event::MetaEvent(MetaEvent::Lifecycle(
            LifecycleEvent::Connect(MetaHeader { time, self_id: PeerId::new(id) })
        ))),
        (time(), any::<i64>(), any::<bool>(), any::<bool>(), 0i64..600_000).prop_map(
            |(time, id, online, good, interval)| Event::MetaEvent(MetaEvent::Heartbeat(HeartbeatEvent {
                time,
                self_id: PeerId::new(id),
                status: HeartbeatStatus { online, good },
                interval,
            }))
        ),
        (body(), any::<i64>()).prop_map(|(body, target_id)| Event::Message(MessageEvent::Private(
            PrivateMessage { body, target_id }
        ))),
        (body(), any::<i64>()).prop_map(|(body, group_id)| Event::Message(MessageEvent::Group(
            GroupMessage { body, group_id }
        ))),
    ]
}

proptest! {
    #[test]
    fn serialized_event_parses_back(e in event()) {
        let text = serde_json::to_string(&e).unwrap();
        let parsed = parse_at(&text, NOW).unwrap();
        prop_assert_eq!(parsed, InboundFrame::Event(e));
    }

    #[test]
    fn future_timestamps_fail(offset in 86_401i64..10_000_000, id in any::<i64>()) {
        let e = Event::MetaEvent(MetaEvent::Lifecycle(LifecycleEvent::Connect(MetaHeader {
            time: NOW + offset,
            self_id: PeerId::new(id),
        })));
        let text = serde_json::to_string(&e).unwrap();
        prop_assert!(parse_at(&text, NOW).is_err());
    }

    #[test]
    fn non_positive_timestamps_fail(time in i64::MIN..=0) {
        let text = serde_json::json!({
            "post_type": "meta_event",
            "meta_event_type": "lifecycle",
            "sub_type": "connect",
            "time": time,
            "self_id": 1,
        })
        .to_string();
        prop_assert!(parse_at(&text, NOW).is_err());
    }
}
