//! `GatewayServer`: Axum HTTP + WebSocket front end wiring the registry,
//! correlator, and dispatcher together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::BotApi;
use crate::auth::{TokenQuery, authorized, extract_token};
use crate::config::ServerConfig;
use crate::correlator::Correlator;
use crate::dispatch::{EventDispatcher, HandlerTable};
use crate::health::{self, HealthResponse};
use crate::inbound::InboundLoop;
use crate::registry::ConnectionRegistry;
use crate::session::{SessionContext, run_peer_session};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<Correlator>,
    session: SessionContext,
    shutdown: Arc<ShutdownCoordinator>,
    access_token: Option<Arc<str>>,
    max_message_size: usize,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// The OneBot gateway.
pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<Correlator>,
    api: BotApi,
    session: SessionContext,
    shutdown: Arc<ShutdownCoordinator>,
    dispatcher_task: Mutex<Option<JoinHandle<()>>>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl GatewayServer {
    /// Build the gateway and start its event dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, handlers: HandlerTable, metrics: Option<PrometheusHandle>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let correlator = Arc::new(Correlator::new(registry.clone(), config.call_timeout()));
        let api = BotApi::new(correlator.clone());

        let (dispatcher, dispatcher_task) =
            EventDispatcher::spawn(handlers, api.clone(), config.event_queue_capacity, shutdown.token());
        let inbound = InboundLoop::new(
            registry.clone(),
            correlator.clone(),
            dispatcher,
            config.abandon_calls_on_disconnect,
        );
        let session = SessionContext::new(&config, registry.clone(), inbound);

        Self {
            config,
            registry,
            correlator,
            api,
            session,
            shutdown,
            dispatcher_task: Mutex::new(Some(dispatcher_task)),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            correlator: self.correlator.clone(),
            session: self.session.clone(),
            shutdown: self.shutdown.clone(),
            access_token: self.config.access_token.as_deref().map(Arc::from),
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(&self.config.ws_path, get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// On shutdown every peer connection is closed before the serve loop
    /// drains.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let registry = self.registry.clone();
        let signal = async move {
            token.cancelled_owned().await;
            let closed = registry.close_all();
            info!(closed, "shutdown requested, closed peer connections");
        };

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).with_graceful_shutdown(signal).await {
                error!(error = %err, "gateway serve loop failed");
            }
            info!("gateway serve loop stopped");
        });

        info!(%local_addr, ws_path = %self.config.ws_path, "gateway listening");
        Ok((local_addr, handle))
    }

    /// Trigger shutdown and wait for the serve loop and dispatcher.
    pub async fn stop(&self, serve: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let mut handles = vec![serve];
        if let Some(dispatcher) = self.dispatcher_task.lock().take() {
            handles.push(dispatcher);
        }
        self.shutdown.drain(handles, timeout).await
    }

    /// Actions API for issuing correlated calls.
    pub fn api(&self) -> &BotApi {
        &self.api
    }

    /// Peer bindings.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Pending call table.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.correlator.pending_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET {ws_path}: authenticate, then upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let presented = extract_token(&headers, &query);
    if !authorized(state.access_token.as_deref(), presented.as_deref()) {
        warn!(token_present = presented.is_some(), "rejected upgrade: bad access token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match upgrade {
        Ok(ws) => {
            let session = state.session.clone();
            ws.max_message_size(state.max_message_size)
                .on_upgrade(move |socket| run_peer_session(socket, session))
        }
        Err(rejection) => rejection.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use super::*;

    fn make_server(config: ServerConfig) -> GatewayServer {
        GatewayServer::new(config, HandlerTable::new(), None)
    }

    async fn get_status(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_status(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["peers"], 0);
        assert_eq!(parsed["pending_calls"], 0);
    }

    #[tokio::test]
    async fn health_reports_draining_after_shutdown() {
        let server = make_server(ServerConfig::default());
        server.shutdown().shutdown();
        let (_, body) = get_status(server.router(), "/health").await;
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "draining");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let server = make_server(ServerConfig::default());
        let (status, _) = get_status(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = GatewayServer::new(ServerConfig::default(), HandlerTable::new(), Some(handle));
        let (status, _) = get_status(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_requires_token_when_configured() {
        let config = ServerConfig {
            access_token: Some("s3cret".into()),
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let (status, _) = get_status(server.router(), "/ws").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get_status(server.router(), "/ws?access_token=wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_with_valid_token_but_no_upgrade_is_rejected() {
        let config = ServerConfig {
            access_token: Some("s3cret".into()),
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let (status, _) = get_status(server.router(), "/ws?access_token=s3cret").await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn custom_ws_path_is_mounted() {
        let config = ServerConfig {
            ws_path: "/onebot/v11/ws".into(),
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let (status, _) = get_status(server.router(), "/ws").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_status(server.router(), "/onebot/v11/ws").await;
        assert_ne!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server(ServerConfig::default());
        let (addr, serve) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.stop(serve, Some(Duration::from_secs(5))).await);
        assert!(server.shutdown().is_shutting_down());
    }
}
