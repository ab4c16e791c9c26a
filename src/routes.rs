use std::{
    io::ErrorKind,
    path::{Component, Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};
use url::Url;

use crate::{
    capability::CapabilityProbe,
    engine::MediaEngine,
    error::ApiError,
    format::{MediaKind, QualityTier},
    pipeline::{self, DownloadRequest, ReconciledDownload},
    preview::{PreviewResult, resolve_preview},
    sanitize::{attachment_disposition, media_type_for},
};

const INDEX_HTML: &str = include_str!("../templates/index.html");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn MediaEngine>,
    pub probe: Arc<CapabilityProbe>,
    pub download_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DownloadPayload {
    url: Option<String>,
    format: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InfoPayload {
    url: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/download", post(start_download))
        .route("/api/info", post(fetch_info))
        .route("/static/downloads/{*path}", get(serve_download))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn start_download(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ReconciledDownload>, ApiError> {
    let payload: DownloadPayload = parse_payload(&body)?;
    let url = validated_url(payload.url.as_deref())?;
    let request = DownloadRequest {
        url,
        kind: MediaKind::from_request(payload.media_type.as_deref()),
        quality: payload.format.as_deref().and_then(QualityTier::parse),
    };

    pipeline::download(
        state.engine.as_ref(),
        &state.probe,
        &state.download_dir,
        &request,
    )
    .await
    .map(Json)
    .map_err(|error| {
        error!("Download failed: {error}");
        ApiError::internal(format!("Download failed: {error}"))
    })
}

async fn fetch_info(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PreviewResult>, ApiError> {
    let payload: InfoPayload = parse_payload(&body)?;
    let url = validated_url(payload.url.as_deref())?;

    resolve_preview(state.engine.as_ref(), &url)
        .await
        .map(Json)
        .map_err(|error| {
            error!("Error extracting info: {error}");
            ApiError::internal(format!("Info fetch failed: {error}"))
        })
}

/// Reads a JSON body regardless of its `Content-Type`. An empty body is an
/// empty object.
fn parse_payload<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request(format!("Invalid request body: {error}")))
}

fn validated_url(url: Option<&str>) -> Result<String, ApiError> {
    let url = url
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required."))?;

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url.to_string()),
        _ => Err(ApiError::bad_request("URL must be an http or https link.")),
    }
}

async fn serve_download(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(file_path) = locate_download(&state.download_dir, &path).await else {
        warn!("File not found: {path}");
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    match stream_attachment(&file_path).await {
        Ok(response) => response,
        Err(error) => {
            error!("Could not serve {:?}: {error}", file_path);
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
    }
}

/// Resolves a decoded request path to a regular file inside `download_dir`.
async fn locate_download(download_dir: &FsPath, relative: &str) -> Option<PathBuf> {
    let relative = FsPath::new(relative);
    let mut components = relative.components().peekable();
    components.peek()?;
    if !components.all(|component| matches!(component, Component::Normal(_))) {
        return None;
    }

    let candidate = download_dir.join(relative);
    let metadata = tokio::fs::metadata(&candidate).await.ok()?;
    if !metadata.is_file() {
        return None;
    }

    let canonical_dir = tokio::fs::canonicalize(download_dir).await.ok()?;
    let canonical_candidate = tokio::fs::canonicalize(&candidate).await.ok()?;
    if !canonical_candidate.starts_with(&canonical_dir) {
        warn!(
            "Blocked a file outside the download directory: {:?}",
            canonical_candidate
        );
        return None;
    }

    Some(canonical_candidate)
}

async fn stream_attachment(path: &FsPath) -> std::io::Result<Response> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download.bin")
        .to_string();
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(media_type_for(&filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    let disposition = HeaderValue::from_str(&attachment_disposition(&filename))
        .map_err(|error| std::io::Error::new(ErrorKind::InvalidData, error))?;
    headers.insert(CONTENT_DISPOSITION, disposition);

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}
