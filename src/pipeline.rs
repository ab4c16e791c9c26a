use std::{io::ErrorKind, path::Path};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    capability::{CapabilityProbe, CapabilityState},
    engine::{ExtractionError, MediaEngine},
    format::{FormatPlan, MediaKind, QualityTier, resolve_format},
    reconcile::reconcile,
};

/// Route under which the download directory is served.
pub const DOWNLOADS_ROUTE_PREFIX: &str = "/static/downloads";

const PROGRESSIVE_NOTE: &str = "progressive (no merge)";
const AUDIO_WITHOUT_TRANSCODER_WARNING: &str = "Downloaded using progressive format. Audio codec may not be MP3 because FFmpeg was not detected.";
const VIDEO_WITHOUT_TRANSCODER_WARNING: &str = "FFmpeg not detected. Downloaded a single-file format; audio codec may be Opus/Vorbis. Install FFmpeg to merge best video+audio into MP4.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: MediaKind,
    pub quality: Option<QualityTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledDownload {
    pub title: Option<String>,
    pub filename: String,
    pub download_url: String,
    pub ext: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub audio_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not prepare the download directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Resolves, runs and reconciles one download.
///
/// Each request writes into its own `download_dir/<uuid>/` so that the
/// newest-file fallback never picks up another request's output.
pub async fn download(
    engine: &dyn MediaEngine,
    probe: &CapabilityProbe,
    download_dir: &Path,
    request: &DownloadRequest,
) -> Result<ReconciledDownload, DownloadError> {
    let capability = probe.probe();
    let plan = resolve_format(request.kind, request.quality, capability);
    debug!("Resolved format for {}: {:?}", request.url, plan);

    let job_id = Uuid::new_v4().to_string();
    let job_dir = download_dir.join(&job_id);
    tokio::fs::create_dir_all(&job_dir)
        .await
        .map_err(DownloadError::Workspace)?;

    let result = match engine.extract(&request.url, &plan, &job_dir).await {
        Ok(result) => result,
        Err(error) => {
            cleanup_job_dir(&job_dir).await;
            return Err(error.into());
        }
    };

    let filename = reconcile(&result.expected_filename, request.kind, &job_dir).await;
    info!("Download successful: {job_id}/{filename}");

    Ok(ReconciledDownload {
        title: result.title,
        download_url: download_url(&job_id, &filename),
        filename,
        ext: result.ext,
        duration: result.duration,
        uploader: result.uploader,
        audio_note: audio_note(&plan),
        warning: capability_warning(request.kind, capability, result.acodec.as_deref())
            .map(ToString::to_string),
    })
}

pub fn download_url(job_id: &str, filename: &str) -> String {
    format!(
        "{DOWNLOADS_ROUTE_PREFIX}/{job_id}/{}?download=true",
        urlencoding::encode(filename)
    )
}

fn audio_note(plan: &FormatPlan) -> String {
    match (&plan.output_container, plan.media_kind) {
        (Some(container), MediaKind::Audio) => format!(
            "{container} (libmp3lame {})",
            plan.audio_bitrate().unwrap_or("default bitrate")
        ),
        (Some(container), MediaKind::Video) => {
            format!("merged {container} (bestvideo+bestaudio)")
        }
        (None, _) => PROGRESSIVE_NOTE.to_string(),
    }
}

/// Caveat attached to downloads made without a transcoder.
pub fn capability_warning(
    kind: MediaKind,
    capability: CapabilityState,
    acodec: Option<&str>,
) -> Option<&'static str> {
    if capability.transcode_available {
        return None;
    }

    match kind {
        MediaKind::Audio => Some(AUDIO_WITHOUT_TRANSCODER_WARNING),
        MediaKind::Video => {
            let acodec = acodec.unwrap_or_default().to_ascii_lowercase();
            matches!(acodec.as_str(), "opus" | "vorbis")
                .then_some(VIDEO_WITHOUT_TRANSCODER_WARNING)
        }
    }
}

async fn cleanup_job_dir(job_dir: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(job_dir).await
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not clean up {:?}: {error}", job_dir);
    }
}
