//! The external media-extraction engine, seen through a narrow interface.
//!
//! The rest of the crate only knows [`MediaEngine`]: hand it a URL and a
//! [`FormatPlan`] and it either leaves a file in the output directory and
//! reports metadata, or fails with an [`ExtractionError`].

mod ytdlp;

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::{format::FormatPlan, sanitize::sanitize_filename};

pub use ytdlp::YtDlpEngine;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{program} is not installed on this system")]
    NotInstalled { program: String },

    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction exceeded the {0:?} time limit")]
    TimedOut(Duration),

    /// The engine ran and reported a failure (network, private media,
    /// unsupported URL, no matching format).
    #[error("{0}")]
    Failed(String),

    #[error("unreadable engine output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Metadata the engine reports about one media item.
///
/// Every field is optional; the engine omits whatever the source site does
/// not provide.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub acodec: Option<String>,
    pub filepath: Option<String>,
    #[serde(rename = "_filename")]
    pub filename: Option<String>,
    pub requested_formats: Option<Vec<Option<MediaFormat>>>,
    pub formats: Option<Vec<Option<MediaFormat>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaFormat {
    pub format_id: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Kept loose: a malformed height must not make the whole payload
    /// unreadable.
    pub height: Option<serde_json::Value>,
}

impl MediaFormat {
    pub fn has_video(&self) -> bool {
        is_codec_present(self.vcodec.as_deref())
    }

    pub fn has_audio(&self) -> bool {
        is_codec_present(self.acodec.as_deref())
    }

    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Positive integral height, if the engine reported a usable one.
    pub fn height(&self) -> Option<u32> {
        let value = self.height.as_ref()?;
        let height = value
            .as_u64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|height| height.is_finite() && *height >= 0.0)
                    .map(|height| height as u64)
            })
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()))?;
        u32::try_from(height).ok().filter(|height| *height > 0)
    }

    pub fn ext_lowercase(&self) -> String {
        self.ext.as_deref().unwrap_or_default().to_ascii_lowercase()
    }
}

fn is_codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(value) if !value.is_empty() && value != "none")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub ext: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub acodec: Option<String>,
    /// Bare filename, relative to the output directory.
    pub expected_filename: String,
}

impl ExtractionResult {
    pub fn from_info(info: MediaInfo) -> Self {
        let expected_filename = expected_filename(&info);
        Self {
            title: info.title,
            ext: info.ext,
            duration: info.duration,
            uploader: info.uploader,
            acodec: info.acodec,
            expected_filename,
        }
    }
}

/// Best guess at the name of the file the engine wrote.
pub fn expected_filename(info: &MediaInfo) -> String {
    let reported = info
        .filepath
        .as_deref()
        .or(info.filename.as_deref())
        .and_then(|path| Path::new(path).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty());
    if let Some(name) = reported {
        return name.to_string();
    }

    let ext = info
        .ext
        .as_deref()
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    let stem = info
        .title
        .as_deref()
        .map(sanitize_filename)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "download".to_string());
    format!("{stem}.{ext}")
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Downloads the media at `url` into `output_dir` following `plan`.
    async fn extract(
        &self,
        url: &str,
        plan: &FormatPlan,
        output_dir: &Path,
    ) -> Result<ExtractionResult, ExtractionError>;

    /// Fetches metadata only; nothing is written to disk.
    async fn inspect(&self, url: &str, format_expression: &str)
    -> Result<MediaInfo, ExtractionError>;
}
