use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use crate::engine::{ExtractionError, MediaEngine, MediaFormat, MediaInfo};

/// Biased toward a single progressive stream the browser can play directly.
pub const PREVIEW_FORMAT_EXPRESSION: &str = "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio/best";

const PREVIEW_EXTENSIONS: [&str; 2] = ["mp4", "webm"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewResult {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub webpage_url: Option<String>,
    pub preview_url: Option<String>,
    pub best_ext: Option<String>,
    pub best_height: Option<u32>,
    pub best_quality_label: Option<String>,
}

pub async fn resolve_preview(
    engine: &dyn MediaEngine,
    url: &str,
) -> Result<PreviewResult, ExtractionError> {
    let info = engine.inspect(url, PREVIEW_FORMAT_EXPRESSION).await?;
    Ok(build_preview(info))
}

pub fn build_preview(info: MediaInfo) -> PreviewResult {
    let preview_url = select_preview_url(&info);
    let best = best_quality(info.formats.as_deref().unwrap_or_default());
    let best_height = best.as_ref().map(|(height, _)| *height);

    PreviewResult {
        title: info.title,
        thumbnail: info.thumbnail,
        duration: info.duration,
        uploader: info.uploader,
        webpage_url: info.webpage_url,
        preview_url,
        best_ext: best.and_then(|(_, ext)| ext),
        best_height,
        best_quality_label: best_height.and_then(quality_label),
    }
}

fn select_preview_url(info: &MediaInfo) -> Option<String> {
    if let Some(url) = info.url.as_deref().filter(|url| !url.is_empty()) {
        return Some(url.to_string());
    }

    let requested = flatten(info.requested_formats.as_deref());
    let all = flatten(info.formats.as_deref());

    let tiers: [(&str, &[&MediaFormat], fn(&MediaFormat) -> bool); 4] = [
        ("combined a/v", requested.as_slice(), has_both_codecs),
        ("video-only", requested.as_slice(), MediaFormat::has_video),
        ("fallback", all.as_slice(), is_browser_playable),
        ("last-resort", all.as_slice(), MediaFormat::has_video),
    ];

    tiers.into_iter().find_map(|(tier, formats, accepts)| {
        let format = formats.iter().find(|f| f.has_url() && accepts(**f))?;
        info!(
            "Found {tier} preview format: {}",
            format.format_id.as_deref().unwrap_or("?")
        );
        format.url.clone()
    })
}

fn has_both_codecs(format: &MediaFormat) -> bool {
    format.has_video() && format.has_audio()
}

fn is_browser_playable(format: &MediaFormat) -> bool {
    has_both_codecs(format) && PREVIEW_EXTENSIONS.contains(&format.ext_lowercase().as_str())
}

fn flatten(formats: Option<&[Option<MediaFormat>]>) -> Vec<&MediaFormat> {
    formats.unwrap_or_default().iter().flatten().collect()
}

/// Highest height among formats carrying video, with a representative ext.
fn best_quality(formats: &[Option<MediaFormat>]) -> Option<(u32, Option<String>)> {
    let mut exts_by_height: BTreeMap<u32, BTreeSet<String>> = BTreeMap::new();
    for format in formats.iter().flatten() {
        if format.vcodec.as_deref() == Some("none") {
            continue;
        }
        let Some(height) = format.height() else {
            continue;
        };
        let exts = exts_by_height.entry(height).or_default();
        let ext = format.ext_lowercase();
        if !ext.is_empty() {
            exts.insert(ext);
        }
    }

    let (height, exts) = exts_by_height.into_iter().next_back()?;
    let ext = if exts.contains("mp4") {
        Some("mp4".to_string())
    } else {
        exts.into_iter().next()
    };
    Some((height, ext))
}

pub fn quality_label(height: u32) -> Option<String> {
    let label = match height {
        0 => return None,
        h if h >= 4320 => "8K",
        h if h >= 2160 => "4K",
        h if h >= 1440 => "2K",
        h if h >= 1080 => "FHD",
        h if h >= 720 => "HD",
        h if h >= 480 => "SD",
        h => return Some(format!("{h}p")),
    };
    Some(label.to_string())
}
