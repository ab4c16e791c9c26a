use std::{io::ErrorKind, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

use super::{ExtractionError, ExtractionResult, MediaEngine, MediaInfo};
use crate::format::{FormatPlan, MediaKind};

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// [`MediaEngine`] backed by the `yt-dlp` command line program.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: String,
    timeout: Option<Duration>,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, ExtractionError> {
        debug!("Running {} {:?}", self.program, args);
        let command_future = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => timeout(limit, command_future)
                .await
                .map_err(|_| ExtractionError::TimedOut(limit))?,
            None => command_future.await,
        }
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                ExtractionError::NotInstalled {
                    program: self.program.clone(),
                }
            } else {
                ExtractionError::Spawn {
                    program: self.program.clone(),
                    source: error,
                }
            }
        })?;

        if !output.status.success() {
            let message = run_error_message(&output.stderr);
            warn!("{} failed: {message}", self.program);
            return Err(ExtractionError::Failed(message));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn extract(
        &self,
        url: &str,
        plan: &FormatPlan,
        output_dir: &Path,
    ) -> Result<ExtractionResult, ExtractionError> {
        let output = self.run(download_args(url, plan, output_dir)).await?;
        let info = last_json_line(&output.stdout)?;
        Ok(ExtractionResult::from_info(info))
    }

    async fn inspect(
        &self,
        url: &str,
        format_expression: &str,
    ) -> Result<MediaInfo, ExtractionError> {
        let output = self.run(inspect_args(url, format_expression)).await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

fn common_args() -> Vec<String> {
    [
        "--no-playlist",
        "--no-warnings",
        "--no-check-certificate",
        "--no-write-subs",
        "--no-write-auto-subs",
        "--no-write-info-json",
    ]
    .map(ToString::to_string)
    .to_vec()
}

pub(super) fn download_args(url: &str, plan: &FormatPlan, output_dir: &Path) -> Vec<String> {
    let mut args = common_args();
    args.extend([
        "--skip-unavailable-fragments".to_string(),
        "--no-keep-fragments".to_string(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        "after_move:%()j".to_string(),
        "-f".to_string(),
        plan.format_expression.clone(),
        "-o".to_string(),
        output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
    ]);

    if let Some(container) = &plan.output_container {
        let stage = match plan.media_kind {
            MediaKind::Audio => {
                args.extend(["-x".into(), "--audio-format".into(), container.clone()]);
                "ExtractAudio"
            }
            MediaKind::Video => {
                args.extend([
                    "--merge-output-format".into(),
                    container.clone(),
                    "--remux-video".into(),
                    container.clone(),
                ]);
                "Merger+ffmpeg"
            }
        };

        if !plan.post_process_args.is_empty() {
            args.push("--postprocessor-args".to_string());
            args.push(format!("{stage}:{}", plan.post_process_args.join(" ")));
        }
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

pub(super) fn inspect_args(url: &str, format_expression: &str) -> Vec<String> {
    let mut args = common_args();
    args.extend([
        "-J".to_string(),
        "-f".to_string(),
        format_expression.to_string(),
        "--".to_string(),
        url.to_string(),
    ]);
    args
}

/// The post-move JSON is the last non-empty line yt-dlp prints.
fn last_json_line(stdout: &[u8]) -> Result<MediaInfo, ExtractionError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .ok_or_else(|| ExtractionError::Failed("yt-dlp reported no downloaded file".to_string()))?;
    Ok(serde_json::from_str(line)?)
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(|line| line.strip_prefix("ERROR:").unwrap_or(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "yt-dlp could not complete the operation".to_string())
}
