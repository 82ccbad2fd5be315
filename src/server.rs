//! HTTP front end: the analyze endpoint, a health probe and the static UI.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analysis::{Analyzer, AnthropicClient};
use crate::archive::{ArchiveSource, WaybackClient};
use crate::config::Config;
use crate::error::ApiError;
use crate::timeline::{self, Timeline};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub api_key_configured: bool,
    pub archive: Arc<dyn ArchiveSource>,
    pub analyzer: Arc<dyn Analyzer>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let archive = WaybackClient::new(&config.archive).context("Failed to build archive client")?;
        Ok(Self {
            api_key_configured: config.api_key_configured(),
            archive: Arc::new(archive),
            analyzer: Arc::new(AnthropicClient::new(&config.anthropic)),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub domain: String,
}

impl AnalyzeRequest {
    /// An empty object counts as no body at all, as does anything that is not an object.
    fn from_body(body: Value) -> Result<Self, ApiError> {
        match body {
            Value::Object(fields) if !fields.is_empty() => {
                serde_json::from_value(Value::Object(fields)).map_err(|_| ApiError::InvalidBody)
            }
            _ => Err(ApiError::InvalidBody),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub api_key_configured: bool,
}

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AnyOrigin)
        .allow_origin(AnyOrigin);

    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        api_key_configured: state.api_key_configured,
    })
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Timeline>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::InvalidBody)?;
    let request = AnalyzeRequest::from_body(body)?;
    if request.domain.trim().is_empty() {
        return Err(ApiError::DomainRequired);
    }

    let timeline = timeline::build_timeline(
        state.archive.as_ref(),
        state.analyzer.as_ref(),
        &request.domain,
        &ProgressBar::hidden(),
    )
    .await?;

    Ok(Json(timeline))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(message).into_response()
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let app = create_router(state, Path::new(&config.static_dir));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    if !config.api_key_configured() {
        info!("ANTHROPIC_API_KEY not set; analyses will return placeholders");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
