//! HTTP surface: `POST /download`, `GET /file/{filename}`, `GET /api/user`.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::error::DownloadError;
use crate::models::{DownloadPayload, DownloadRequest, DownloadResponse};
use crate::service::{is_plain_file_name, DownloadService};
use crate::usage::{GuestUser, UsageStore};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DownloadService>,
    pub usage: Arc<dyn UsageStore>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/download", post(download))
        .route("/file/{filename}", get(serve_file))
        .route("/api/user", get(current_user))
        .route("/api/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadPayload>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = DownloadRequest::try_from(payload)?;

    let artifact = state.service.download(&request).await?;

    if let Err(e) = state.usage.record(artifact.kind).await {
        warn!("Failed to record usage: {:#}", e);
    }

    Ok(Json(DownloadResponse::from(&artifact)))
}

async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&filename) {
        return Err(ApiError::bad_request("Invalid file name"));
    }

    let path = state
        .service
        .stored_file(&filename)
        .await
        .ok_or_else(|| ApiError::not_found(format!("File not found: {}", filename)))?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to open {}: {}", filename, e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stat {}: {}", filename, e)))?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&filename))
            .map_err(|_| ApiError::internal("Failed to build download header"))?,
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

async fn current_user(State(state): State<AppState>) -> Result<Json<GuestUser>, ApiError> {
    let usage = state
        .usage
        .snapshot()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read usage: {:#}", e)))?;
    Ok(Json(GuestUser::new(usage, state.usage.since())))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "ffmpeg": state.service.ffmpeg().map(|p| p.to_string_lossy().into_owned()),
    }))
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = FsPath::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "m4a" | "alac" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "opus" | "vorbis" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_unicode_in_extended_param() {
        let value = content_disposition("Café \"Live\".mp3");
        assert_eq!(
            value,
            "attachment; filename=\"Caf_ _Live_.mp3\"; filename*=UTF-8''Caf%C3%A9%20%22Live%22.mp3"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for_filename("a.MP3"), "audio/mpeg");
        assert_eq!(content_type_for_filename("a_720p.mp4"), "video/mp4");
        assert_eq!(content_type_for_filename("a.flac"), "audio/flac");
        assert_eq!(content_type_for_filename("noext"), "application/octet-stream");
    }

    #[test]
    fn download_errors_map_to_status() {
        assert_eq!(
            ApiError::from(DownloadError::MissingInput).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DownloadError::ToolUnavailable).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let err = ApiError::from(DownloadError::Fetch("ERROR: private video".into()));
        assert_eq!(err.message, "ERROR: private video");
    }
}
