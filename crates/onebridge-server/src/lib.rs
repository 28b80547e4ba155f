//! # onebridge-server
//!
//! Reverse WebSocket gateway for OneBot v11 bot runtimes.
//!
//! - **Registry**: [`ConnectionRegistry`] binds each bot identity to one live connection
//! - **Handshake**: first frame within a bounded window names the peer
//! - **Correlator**: [`Correlator`] matches action responses to calls by `echo`
//! - **Dispatch**: [`HandlerTable`] routes inbound events to [`EventHandler`]s
//! - **Server**: [`GatewayServer`] serves `/ws`, `/health`, `/metrics`

#![deny(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatch;
pub mod handshake;
pub mod health;
pub mod inbound;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

pub use api::BotApi;
pub use config::ServerConfig;
pub use connection::{ConnectionId, PeerConnection, SendOutcome};
pub use correlator::{Correlator, ResolveOutcome};
pub use dispatch::{EventDispatcher, EventHandler, HandlerContext, HandlerError, HandlerTable};
pub use handshake::{HandshakeError, await_handshake};
pub use inbound::InboundLoop;
pub use registry::{ConnectionRegistry, PeerSender};
pub use server::GatewayServer;
pub use shutdown::ShutdownCoordinator;
