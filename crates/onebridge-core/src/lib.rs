//! # onebridge-core
//!
//! OneBot v11 wire vocabulary shared by the gateway crates:
//!
//! - **IDs**: [`PeerId`] (bot `self_id`) and [`Echo`] (call correlation UUID)
//! - **Events**: the closed [`Event`] union and its message segments
//! - **Parsing**: [`parse`] / [`parse_at`] turn a text frame into an [`InboundFrame`]
//! - **Actions**: [`OneBotRequest`] / [`OneBotResponse`]
//! - **Errors**: [`ParseError`], [`ValidationError`]
//! - **Logging**: subscriber init and test capture

#![deny(unsafe_code)]

pub mod action;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod parse;

pub use action::{OneBotRequest, OneBotResponse, ResponseStatus};
pub use errors::{ParseError, ValidationError, ValidationReason};
pub use events::{Event, EventKind, MessageSegment};
pub use ids::{Echo, PeerId};
pub use parse::{InboundFrame, parse, parse_at, parse_event_at};
