//! Axum HTTP channel: `POST /ask`, `GET /health`, and the static chat page.
//!
//! Runs as a [`Component`]; the shared [`CancellationToken`] drives axum's
//! graceful shutdown.
//!
//! ```text
//! POST /ask      → agent
//! GET  /health   → {"status":"ok","agent":..,"sessions":n}
//! GET  /*path    → static_dir (SPA fallback to index.html)
//! ```

mod api;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, header};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::CompressionLevel;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agents::Agent;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

/// Router state handed to every handler.  Cheap to clone.
#[derive(Clone)]
pub struct HttpState {
    pub agent: Arc<Agent>,
    pub request_timeout: Duration,
}

pub struct HttpChannel {
    config: ServerConfig,
    agent: Arc<Agent>,
}

impl HttpChannel {
    pub fn new(config: ServerConfig, agent: Arc<Agent>) -> Self {
        Self { config, agent }
    }
}

impl Component for HttpChannel {
    fn id(&self) -> &str {
        "http"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(serve(self.config, self.agent, shutdown))
    }
}

async fn serve(config: ServerConfig, agent: Arc<Agent>, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(agent, &config);

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| AppError::Http(format!("bind failed on {}: {e}", config.bind)))?;
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.bind.clone());

    info!(bind = %local, "http channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("server error: {e}")))?;

    info!("http channel shut down");
    Ok(())
}

/// Full router with middleware.  Public so tests can drive it in-process.
pub fn build_router(agent: Arc<Agent>, config: &ServerConfig) -> Router {
    let state = HttpState { agent, request_timeout: Duration::from_secs(config.request_timeout_seconds) };

    let mut router = Router::new()
        .route("/ask", post(api::ask))
        .route("/health", get(api::health))
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        router = router.fallback_service(static_files(dir));
    }

    router = router
        .layer(CompressionLayer::new().quality(CompressionLevel::Precise(5)))
        .layer(CorsLayer::permissive())
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::X_FRAME_OPTIONS, "SAMEORIGIN"))
        .layer(security_header(header::X_XSS_PROTECTION, "1; mode=block"));

    if config.http_trace {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn static_files(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}
