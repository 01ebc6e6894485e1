//! HTTP surface of the relay
//!
//! `GET /mcp` opens a session stream, `POST /mcp` accepts messages, and
//! `GET /health` reports liveness. All handlers share one [`AppState`]
//! holding the injected session registry and dispatcher.

pub mod auth;
pub mod ingress;
pub mod registry;
pub mod stream;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::mcp::{Dispatcher, McpDispatcher};

pub use registry::{SessionGuard, SessionId, SessionQueue, SessionRegistry, SessionState};

/// Route serving both the stream and ingress handlers
pub const MCP_PATH: &str = "/mcp";

/// Query parameter naming the target session on `POST /mcp`
pub const SESSION_QUERY_PARAM: &str = "sessionId";

pub const HEALTH_PATH: &str = "/health";

/// Interval between keep-alive markers when nothing is configured
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Transport settings resolved from [`Config`] once at startup.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub keep_alive: Duration,
    /// Fixed base URL for bootstrap events; derived per request when `None`
    pub public_url: Option<Url>,
    /// Authority used when a request carries no `Host` header
    pub fallback_authority: String,
    pub api_key: Option<String>,
    pub max_body_bytes: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            public_url: None,
            fallback_authority: "127.0.0.1:3001".to_string(),
            api_key: None,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            keep_alive: Duration::from_secs(config.server.keep_alive_seconds),
            public_url: config.public_url()?,
            fallback_authority: config.bind_addr()?.to_string(),
            api_key: config.auth.effective_api_key().map(String::from),
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    /// Base URL advertised to a streaming client.
    ///
    /// The configured public URL wins. Otherwise the scheme comes from
    /// `X-Forwarded-Proto` and the authority from `X-Forwarded-Host` or
    /// `Host`, as seen by the client.
    pub fn base_url(&self, headers: &HeaderMap) -> std::result::Result<Url, RelayError> {
        if let Some(url) = &self.public_url {
            return Ok(url.clone());
        }

        let scheme = first_header_value(headers, "x-forwarded-proto")
            .filter(|proto| proto.eq_ignore_ascii_case("https") || proto.eq_ignore_ascii_case("http"))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "http".to_string());

        let authority = first_header_value(headers, "x-forwarded-host")
            .or_else(|| first_header_value(headers, header::HOST.as_str()))
            .unwrap_or(self.fallback_authority.as_str());

        Ok(Url::parse(&format!("{}://{}", scheme, authority))?)
    }
}

/// First comma-separated element of a header, trimmed; proxies append.
fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub settings: Arc<RelaySettings>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            settings: Arc::new(settings),
        }
    }

    /// Fresh registry plus the default dispatcher, all from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(McpDispatcher::from_config(config)),
            RelaySettings::from_config(config)?,
        ))
    }
}

/// Assemble the application router.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.settings.max_body_bytes;
    Router::new()
        .route(MCP_PATH, get(stream::open_stream).post(ingress::handle_post))
        .route(HEALTH_PATH, get(health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub sessions: usize,
    pub server_time: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        message: "MCP Server is running",
        sessions: state.registry.len(),
        server_time: chrono::Utc::now().to_rfc3339(),
    })
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind(config.bind_addr()?).await?;
    serve_listener(listener, state).await
}

/// Serve on an already-bound listener.
///
/// Shutdown does not drain open streams: they are idle by nature and would
/// hold the process forever. Dropping them runs each session's cleanup.
pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    if state.settings.api_key.is_none() {
        tracing::warn!("MCP_API_KEY is not set; /mcp endpoints are unauthenticated");
    }
    tracing::info!(%addr, keep_alive = ?state.settings.keep_alive, "MCP relay listening");

    let router = build_router(state);
    tokio::select! {
        result = axum::serve(listener, router).into_future() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }
    Ok(())
}
