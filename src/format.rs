use crate::capability::CapabilityState;

/// Container forced on merged video downloads when a transcoder is present.
pub const MERGED_VIDEO_CONTAINER: &str = "mp4";
pub const TRANSCODED_AUDIO_CONTAINER: &str = "mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Anything other than `"audio"` is a video request.
    pub fn from_request(value: Option<&str>) -> Self {
        match value.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "audio" => Self::Audio,
            _ => Self::Video,
        }
    }

    /// Extensions the reconciler accepts as output of this kind.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Video => &["mp4", "webm", "mkv"],
            Self::Audio => &["mp3", "m4a", "ogg", "opus"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    P1080,
    P720,
    P480,
    Kbps320,
    Kbps128,
}

impl QualityTier {
    /// Unknown labels yield `None`, which resolves like "best".
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1080p" => Some(Self::P1080),
            "720p" => Some(Self::P720),
            "480p" => Some(Self::P480),
            "320kbps" => Some(Self::Kbps320),
            "128kbps" => Some(Self::Kbps128),
            _ => None,
        }
    }

    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::Kbps320 | Self::Kbps128 => None,
        }
    }
}

/// A fully resolved engine configuration for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPlan {
    pub media_kind: MediaKind,
    pub format_expression: String,
    pub output_container: Option<String>,
    pub post_process_args: Vec<String>,
}

impl FormatPlan {
    pub fn transcodes(&self) -> bool {
        self.output_container.is_some()
    }

    /// Bitrate passed to the audio encoder, if this plan re-encodes audio.
    pub fn audio_bitrate(&self) -> Option<&str> {
        self.post_process_args
            .iter()
            .position(|arg| arg == "-b:a")
            .and_then(|index| self.post_process_args.get(index + 1))
            .map(String::as_str)
    }
}

pub fn resolve_format(
    kind: MediaKind,
    quality: Option<QualityTier>,
    capability: CapabilityState,
) -> FormatPlan {
    let transcode = capability.transcode_available;

    let format_expression = match kind {
        MediaKind::Audio => match quality {
            Some(QualityTier::Kbps128) => "worstaudio[ext=mp3]/worstaudio/best".to_string(),
            _ => "bestaudio[ext=mp3]/bestaudio/best".to_string(),
        },
        MediaKind::Video => match (quality.and_then(QualityTier::max_height), transcode) {
            (Some(height), true) => format!(
                "bestvideo[height<={height}][ext=mp4][vcodec^=avc1]+bestaudio/best[height<={height}][ext=mp4]/best[height<={height}]"
            ),
            (Some(height), false) => format!(
                "best[height<={height}][ext=mp4][acodec!=none]/best[height<={height}][acodec!=none]"
            ),
            (None, true) => "bestvideo+bestaudio/best".to_string(),
            (None, false) => "best[acodec!=none]/best".to_string(),
        },
    };

    let (output_container, post_process_args) = if !transcode {
        (None, Vec::new())
    } else {
        match kind {
            MediaKind::Audio => {
                let bitrate = match quality {
                    Some(QualityTier::Kbps128) => "128k",
                    _ => "320k",
                };
                (
                    Some(TRANSCODED_AUDIO_CONTAINER.to_string()),
                    ["-c:a", "libmp3lame", "-b:a", bitrate]
                        .map(ToString::to_string)
                        .to_vec(),
                )
            }
            MediaKind::Video => (
                Some(MERGED_VIDEO_CONTAINER.to_string()),
                vec!["-c:v".to_string(), "copy".to_string()],
            ),
        }
    };

    FormatPlan {
        media_kind: kind,
        format_expression,
        output_container,
        post_process_args,
    }
}
