use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use instube::{
    AppState, build_router,
    capability::CapabilityProbe,
    engine::{ExtractionError, ExtractionResult, MediaEngine, MediaInfo},
    format::FormatPlan,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

/// Stands in for yt-dlp: writes `file` into the output directory and
/// answers metadata queries with `info`.
struct FakeEngine {
    file: Option<(&'static str, &'static [u8])>,
    info: Value,
    failure: Option<&'static str>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeEngine {
    fn writing(name: &'static str, contents: &'static [u8]) -> Self {
        Self {
            file: Some((name, contents)),
            info: json!({}),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn answering(info: Value) -> Self {
        Self {
            file: None,
            info,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &'static str) -> Self {
        Self {
            file: None,
            info: json!({}),
            failure: Some(message),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn extract(
        &self,
        url: &str,
        plan: &FormatPlan,
        output_dir: &Path,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), plan.format_expression.clone()));
        if let Some(message) = self.failure {
            return Err(ExtractionError::Failed(message.to_string()));
        }

        let (name, contents) = self.file.expect("fake engine has a file to write");
        tokio::fs::write(output_dir.join(name), contents).await.unwrap();
        Ok(ExtractionResult {
            title: Some("Sample Clip".to_string()),
            ext: Path::new(name)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            duration: Some(12.0),
            uploader: Some("Uploader".to_string()),
            acodec: Some("opus".to_string()),
            expected_filename: name.to_string(),
        })
    }

    async fn inspect(
        &self,
        url: &str,
        format_expression: &str,
    ) -> Result<MediaInfo, ExtractionError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), format_expression.to_string()));
        if let Some(message) = self.failure {
            return Err(ExtractionError::Failed(message.to_string()));
        }
        Ok(serde_json::from_value(self.info.clone())?)
    }
}

struct TestApp {
    _root: TempDir,
    download_dir: PathBuf,
    engine: Arc<FakeEngine>,
    router: Router,
}

impl TestApp {
    fn new(engine: FakeEngine) -> Self {
        let root = tempfile::tempdir().unwrap();
        let download_dir = root.path().join("static").join("downloads");
        let empty_path = root.path().join("bin");
        std::fs::create_dir_all(&download_dir).unwrap();
        std::fs::create_dir_all(&empty_path).unwrap();

        let engine = Arc::new(engine);
        let router = build_router(AppState {
            engine: engine.clone(),
            probe: Arc::new(CapabilityProbe::with_search_path(empty_path)),
            download_dir: download_dir.clone(),
        });

        Self {
            _root: root,
            download_dir,
            engine,
            router,
        }
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

#[tokio::test]
async fn download_without_url_is_rejected_before_the_engine_runs() {
    let app = TestApp::new(FakeEngine::writing("clip.mp4", b"x"));

    let (status, body) = app.post_json("/api/download", json!({"type": "video"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "URL is required."}));
    assert!(app.engine.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new(FakeEngine::writing("clip.mp4", b"x"));
    let request = Request::post("/api/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_body_is_read_without_a_content_type() {
    let app = TestApp::new(FakeEngine::writing("clip.mp4", b"x"));
    let request = Request::post("/api/download")
        .body(Body::from(r#"{"url": "https://example.com/v"}"#))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["filename"], "clip.mp4");
    assert_eq!(app.engine.calls.lock().unwrap()[0].0, "https://example.com/v");
}

#[tokio::test]
async fn info_accepts_a_form_encoded_content_type() {
    let app = TestApp::new(FakeEngine::answering(json!({"title": "Clip"})));
    let request = Request::post("/api/info")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(r#"{"url": "https://example.com/v"}"#))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn download_returns_a_servable_link() {
    let app = TestApp::new(FakeEngine::writing("Sample Clip.mp4", b"video-bytes"));

    let (status, body) = app
        .post_json(
            "/api/download",
            json!({"url": "https://example.com/watch?v=1", "format": "720p", "type": "video"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Sample Clip");
    assert_eq!(body["filename"], "Sample Clip.mp4");
    assert_eq!(body["ext"], "mp4");
    assert_eq!(body["uploader"], "Uploader");
    assert_eq!(body["audio_note"], "progressive (no merge)");
    assert!(
        body["warning"]
            .as_str()
            .is_some_and(|warning| warning.contains("Opus/Vorbis"))
    );

    let download_url = body["download_url"].as_str().unwrap();
    assert!(download_url.starts_with("/static/downloads/"));
    assert!(download_url.ends_with("/Sample%20Clip.mp4?download=true"));

    let calls = app.engine.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![(
            "https://example.com/watch?v=1".to_string(),
            "best[height<=720][ext=mp4][acodec!=none]/best[height<=720][acodec!=none]".to_string()
        )]
    );

    let response = app.get(download_url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Sample Clip.mp4\"; filename*=UTF-8''Sample%20Clip.mp4"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"video-bytes");
}

#[tokio::test]
async fn audio_download_without_transcoder_carries_a_warning() {
    let app = TestApp::new(FakeEngine::writing("Sample Clip.m4a", b"audio"));

    let (status, body) = app
        .post_json(
            "/api/download",
            json!({"url": "https://example.com/a", "format": "320kbps", "type": "audio"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        body["warning"]
            .as_str()
            .is_some_and(|warning| warning.contains("may not be MP3"))
    );
    let calls = app.engine.calls.lock().unwrap().clone();
    assert_eq!(calls[0].1, "bestaudio[ext=mp3]/bestaudio/best");
}

#[tokio::test]
async fn engine_failure_becomes_a_server_error() {
    let app = TestApp::new(FakeEngine::failing("Unsupported URL: https://example.com/x"));

    let (status, body) = app
        .post_json("/api/download", json!({"url": "https://example.com/x"}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "Download failed: Unsupported URL: https://example.com/x"})
    );
    let leftovers = std::fs::read_dir(&app.download_dir).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn info_returns_the_preview_shape() {
    let app = TestApp::new(FakeEngine::answering(json!({
        "title": "Sample Clip",
        "thumbnail": "https://img/thumb.jpg",
        "duration": 42,
        "uploader": "Uploader",
        "webpage_url": "https://example.com/watch?v=1",
        "formats": [
            {"format_id": "140", "url": "https://cdn/audio", "vcodec": "none", "acodec": "mp4a", "ext": "m4a"},
            {"format_id": "18", "url": "https://cdn/18", "vcodec": "avc1", "acodec": "mp4a", "ext": "mp4", "height": 360},
            {"format_id": "137", "url": "https://cdn/137", "vcodec": "avc1", "acodec": "none", "ext": "mp4", "height": 1080}
        ]
    })));

    let (status, body) = app
        .post_json("/api/info", json!({"url": "https://example.com/watch?v=1"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "title": "Sample Clip",
            "thumbnail": "https://img/thumb.jpg",
            "duration": 42.0,
            "uploader": "Uploader",
            "webpage_url": "https://example.com/watch?v=1",
            "preview_url": "https://cdn/18",
            "best_ext": "mp4",
            "best_height": 1080,
            "best_quality_label": "FHD"
        })
    );
    let calls = app.engine.calls.lock().unwrap().clone();
    assert_eq!(calls[0].1, "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio/best");
}

#[tokio::test]
async fn info_without_url_is_rejected() {
    let app = TestApp::new(FakeEngine::answering(json!({})));

    let (status, body) = app.post_json("/api/info", json!({"url": ""})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "URL is required.");
}

#[tokio::test]
async fn info_failure_becomes_a_server_error() {
    let app = TestApp::new(FakeEngine::failing("Private video"));

    let (status, body) = app
        .post_json("/api/info", json!({"url": "https://example.com/p"}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Info fetch failed: Private video");
}

#[tokio::test]
async fn missing_download_is_a_plain_text_404() {
    let app = TestApp::new(FakeEngine::answering(json!({})));

    let response = app.get("/static/downloads/nope/missing.mp4").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"File not found");
}

#[tokio::test]
async fn percent_encoded_names_are_decoded_before_lookup() {
    let app = TestApp::new(FakeEngine::answering(json!({})));
    let job = app.download_dir.join("job-1");
    std::fs::create_dir_all(&job).unwrap();
    std::fs::write(job.join("Canción #1.mp3"), b"song").unwrap();

    let response = app
        .get("/static/downloads/job-1/Canci%C3%B3n%20%231.mp3?download=true")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
}

#[tokio::test]
async fn index_and_health_are_served() {
    let app = TestApp::new(FakeEngine::answering(json!({})));

    let index = app.get("/").await;
    assert_eq!(index.status(), StatusCode::OK);

    let health = app.get("/api/health").await;
    let bytes = to_bytes(health.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        serde_json::from_slice::<Value>(&bytes).unwrap(),
        json!({"status": "ok"})
    );
}
