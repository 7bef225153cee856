//! Collector HTTP server.
//!
//! Receives envelopes from harvesting clients, inflates them and appends the
//! content to the per-file archive under `[server].storage_dir`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/loggather/report` | Append one envelope's content |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! Report responses use a status envelope:
//!
//! ```json
//! { "status": "OK", "data": { "file_name": "app.log", "bytes_written": 4 }, "desc": "" }
//! { "status": "Error", "data": null, "desc": "invalid gzip payload" }
//! ```
//!
//! Malformed JSON, bad base64, an invalid file name, a corrupt gzip payload
//! or one that inflates past `[server].max_chunk_bytes` answer `400`;
//! storage failures answer `500`. Request bodies larger than
//! [`envelope_body_limit`] of the chunk cap are refused with `413`.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::archive::{self, Archive};
use crate::config::{Config, REPORT_ROUTE};
use crate::models::{Envelope, ReportReceipt, Status, StatusResponse};

/// Shared state passed to route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    archive: Archive,
}

/// Starts the collector and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let server = config.server()?;
    let archive =
        Archive::with_max_chunk_bytes(server.storage_dir.clone(), server.max_chunk_bytes);

    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    tracing::info!(
        bind = %server.bind,
        storage_dir = %archive.root().display(),
        max_chunk_bytes = archive.max_chunk_bytes(),
        "collector listening"
    );

    axum::serve(listener, router(archive)).await?;

    Ok(())
}

/// Builds the collector router around an archive.
///
/// The request body limit follows the archive's chunk cap instead of axum's
/// 2 MiB default.
pub fn router(archive: Archive) -> Router {
    let body_limit = envelope_body_limit(archive.max_chunk_bytes());
    Router::new()
        .route(REPORT_ROUTE, post(handle_report))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { archive })
}

/// Largest envelope body a chunk of `max_chunk_bytes` can produce: gzip's
/// worst-case expansion of incompressible input, base64's 4/3 growth, and
/// room for the JSON framing and file name.
pub fn envelope_body_limit(max_chunk_bytes: usize) -> usize {
    let gzip_worst = max_chunk_bytes + max_chunk_bytes / 1000 + 64;
    gzip_worst.div_ceil(3) * 4 + 4096
}

// ============ Error response ============

/// Internal error type that converts into a status-envelope response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body: StatusResponse<()> = StatusResponse {
            status: Status::Error,
            data: None,
            desc: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /loggather/report ============

async fn handle_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse<ReportReceipt>>, AppError> {
    let started = Instant::now();
    let mut file_name = String::new();

    let result = store_report(&state.archive, &body, &mut file_name).await;

    let cost_us = started.elapsed().as_micros() as u64;
    match &result {
        Ok(receipt) => tracing::info!(
            file = %file_name,
            bytes = receipt.bytes_written,
            cost_us,
            "report stored"
        ),
        Err(e) => tracing::error!(
            file = %file_name,
            status = e.status.as_u16(),
            error = %e.message,
            cost_us,
            "report rejected"
        ),
    }

    let receipt = result?;
    Ok(Json(StatusResponse {
        status: Status::Ok,
        data: Some(receipt),
        desc: String::new(),
    }))
}

async fn store_report(
    archive: &Archive,
    body: &[u8],
    file_name: &mut String,
) -> Result<ReportReceipt, AppError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| bad_request(format!("invalid envelope: {}", e)))?;
    file_name.clone_from(&envelope.file_name);

    archive::validate_file_name(&envelope.file_name).map_err(|e| bad_request(e.to_string()))?;

    // Inflate fully before touching the archive so a corrupt payload never
    // writes anything.
    let content = archive::decompress(&envelope.payload, archive.max_chunk_bytes())
        .map_err(|e| bad_request(format!("{:#}", e)))?;

    let bytes_written = archive
        .append(&envelope.file_name, &content)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(ReportReceipt {
        file_name: envelope.file_name,
        bytes_written,
    })
}
