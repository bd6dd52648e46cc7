//! HTTP surface
//!
//! - `GET /`: liveness probe
//! - `GET /warm`: load the matting session ahead of traffic
//! - `POST /cutout`: run the pipeline and return a PNG
//!
//! Pipeline errors are translated to HTTP exactly once, here, through
//! [`status_for`].

use crate::{
    auth::SIGNATURE_HEADER,
    config::CutoutConfig,
    error::{CutoutError, ErrorKind, Result},
    processor::{CutoutProcessor, Credentials},
    types::{CutoutRequest, CutoutResponse},
};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Diagnostic header carrying the transparency ratio
pub const TRANSPARENCY_HEADER: &str = "x-transparency-ratio";

/// Diagnostic header telling whether the fallback composite was returned
pub const FALLBACK_HEADER: &str = "x-cutout-fallback";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    processor: Arc<CutoutProcessor>,
}

/// Build the application router around a processor
pub fn router(processor: Arc<CutoutProcessor>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/warm", get(warm))
        .route("/cutout", post(cutout))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { processor })
}

/// HTTP status for each error kind
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Download
        | ErrorKind::InvalidContent
        | ErrorKind::Decode
        | ErrorKind::Matting
        | ErrorKind::Encode
        | ErrorKind::Model
        | ErrorKind::InvalidConfig
        | ErrorKind::Io
        | ErrorKind::Internal => StatusCode::BAD_GATEWAY,
    }
}

/// Pipeline error rendered as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError(CutoutError);

impl From<CutoutError> for ApiError {
    fn from(error: CutoutError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        let detail = self.0.to_string();

        if self.0.is_server_defect() {
            error!(%status, error = %detail, "request failed");
        } else {
            warn!(%status, error = %detail, "request failed");
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn warm(
    State(state): State<AppState>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let report = state.processor.warm().await?;
    Ok(Json(json!({ "status": "warmed", "took_ms": report.took_ms() })))
}

async fn cutout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CutoutRequest>,
) -> std::result::Result<Response, ApiError> {
    let credentials = Credentials {
        authorization: header_string(&headers, header::AUTHORIZATION.as_str()),
        signature: header_string(&headers, SIGNATURE_HEADER),
    };

    let response = state.processor.process(&request, &credentials).await?;
    png_response(response).map_err(ApiError::from)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn png_response(response: CutoutResponse) -> Result<Response> {
    let ratio = HeaderValue::from_str(&response.transparency_header())
        .map_err(|e| CutoutError::internal(format!("invalid ratio header: {e}")))?;
    let fallback = HeaderValue::from_static(if response.fallback_applied {
        "true"
    } else {
        "false"
    });

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(CutoutResponse::CONTENT_TYPE),
        ),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static(CutoutResponse::CACHE_CONTROL),
        ),
        (HeaderName::from_static(TRANSPARENCY_HEADER), ratio),
        (HeaderName::from_static(FALLBACK_HEADER), fallback),
    ];

    Ok((StatusCode::OK, headers, response.png_bytes).into_response())
}

/// Bind and serve until Ctrl-C
///
/// # Errors
/// - `InvalidConfig` for invalid settings or an unusable bind address
/// - `Io` if the server fails while running
pub async fn serve(config: CutoutConfig) -> Result<()> {
    let processor = Arc::new(CutoutProcessor::new(&config)?);

    if config.server.warm_on_start {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            match processor.warm().await {
                Ok(report) => info!(took_ms = report.took_ms(), "matting session warmed"),
                Err(e) => warn!(error = %e, "warm-up failed; will retry on first request"),
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| {
            CutoutError::invalid_config(format!("failed to bind {}: {e}", config.server.bind))
        })?;
    info!(
        addr = %listener.local_addr()?,
        auth = config.auth.is_enabled(),
        default_max_side = config.pipeline.default_max_side,
        hard_cap = config.pipeline.hard_cap,
        fallback = config.pipeline.fallback_enabled,
        backend = %config.model.backend,
        "cutout service listening"
    );

    axum::serve(listener, router(processor))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
