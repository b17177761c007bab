//! HTTP handlers.
//!
//! Invocation, upload, listing and health endpoints. Every failure is
//! turned into an [`ApiError`] response; nothing here panics on bundle
//! input.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use polyglot_common::RuntimeError;

use crate::request::from_http;
use crate::response::{ApiError, HttpResponse};
use crate::state::AppState;
use crate::upload::is_zip;

/// Bundle summary returned by the listing endpoint.
#[derive(Debug, Serialize)]
pub struct BundleInfo {
    /// Registered name.
    pub name: String,
    /// Language identifier.
    pub language: String,
    /// Entrypoint file relative to the bundle root.
    pub entrypoint: String,
}

/// Invoke a bundle.
///
/// `GET /api/v1/handler/:name` and `POST /api/v1/handler/:name/invoke`. The
/// request body, headers and URI are forwarded to the bundle.
#[instrument(skip(state, headers, body), fields(bundle = %name))]
pub async fn invoke_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<HttpResponse, ApiError> {
    let request = from_http(&method, &uri, &headers, body);
    let response = state.dispatcher().dispatch(&name, &request).await?;
    Ok(HttpResponse(response))
}

/// Upload a bundle archive.
///
/// `POST /api/v1/handler/:name`, `multipart/form-data`. The first part that
/// carries a file name must be a `.zip` archive; other parts are ignored.
///
/// # Response
///
/// ```json
/// { "status": "ok", "message": "Handler greeter uploaded" }
/// ```
#[instrument(skip(state, multipart), fields(bundle = %name))]
pub async fn upload_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (file_name, archive) = first_file_part(multipart).await?;
    if !is_zip(&file_name) {
        warn!(file_name = %file_name, "Rejected non-zip upload");
        return Err(RuntimeError::invalid_bundle(format!(
            "expected a .zip archive, got '{file_name}'"
        ))
        .into());
    }

    let bundle = state.uploader().install(&name, archive).await?;
    info!(language = %bundle.metadata().language, "Handler uploaded");

    Ok(Json(serde_json::json!({
        "status": "ok",
        "message": format!("Handler {name} uploaded"),
    })))
}

/// Read the first multipart field that is a file.
async fn first_file_part(mut multipart: Multipart) -> Result<(String, Bytes), RuntimeError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| RuntimeError::invalid_bundle(format!("malformed multipart body: {e}")))?;

        let Some(field) = field else {
            return Err(RuntimeError::invalid_bundle("no file in upload"));
        };

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| RuntimeError::invalid_bundle(format!("failed to read upload: {e}")))?;
        return Ok((file_name, bytes));
    }
}

/// List registered bundles.
pub async fn list_handlers(State(state): State<AppState>) -> impl IntoResponse {
    let handlers: Vec<BundleInfo> = state
        .registry()
        .bundles()
        .iter()
        .map(|bundle| BundleInfo {
            name: bundle.name().to_string(),
            language: bundle.metadata().language.to_string(),
            entrypoint: bundle.metadata().entrypoint_file.clone(),
        })
        .collect();

    let count = handlers.len();
    Json(serde_json::json!({
        "handlers": handlers,
        "count": count,
    }))
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let sandbox = state.dispatcher().sandbox();

    let body = serde_json::json!({
        "status": "ready",
        "bundles": state.registry().len(),
        "cached_modules": sandbox.cache().len(),
        "pooling_allocator": sandbox.engine().is_pooling_enabled(),
    });

    (StatusCode::OK, Json(body))
}
