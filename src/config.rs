use std::{path::PathBuf, time::Duration};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_STATIC_ROOT: &str = "static";
const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
const DEFAULT_RETENTION_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_SWEEP_SECONDS: u64 = 10 * 60;

/// Server settings, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_root: PathBuf,
    pub ytdlp_program: String,
    /// `None` lets an extraction run for as long as the transfer takes.
    pub ytdlp_timeout: Option<Duration>,
    /// `None` keeps downloads forever.
    pub retention: Option<Duration>,
    pub sweep_interval: Duration,
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
            ytdlp_program: DEFAULT_YTDLP_BIN.to_string(),
            ytdlp_timeout: None,
            retention: Some(Duration::from_secs(DEFAULT_RETENTION_SECONDS)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECONDS),
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; unset or unparsable
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value));
        let read_secs = |name: &str| read(name).and_then(|value| value.parse::<u64>().ok());

        let bind_addr = read("APP_ADDR")
            .or_else(|| {
                read("PORT")
                    .and_then(|value| value.parse::<u16>().ok())
                    .map(|port| format!("0.0.0.0:{port}"))
            })
            .unwrap_or(defaults.bind_addr);

        let retention = match read_secs("DOWNLOAD_RETENTION_SECONDS") {
            Some(0) => None,
            Some(seconds) => Some(Duration::from_secs(seconds)),
            None => defaults.retention,
        };

        Self {
            bind_addr,
            static_root: read("STATIC_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_root),
            ytdlp_program: read("YTDLP_BIN").unwrap_or(defaults.ytdlp_program),
            ytdlp_timeout: read_secs("YTDLP_TIMEOUT_SECONDS")
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
            retention,
            sweep_interval: read_secs("RETENTION_SWEEP_SECONDS")
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            allowed_origins: read("ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .filter_map(non_empty)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.static_root.join("downloads")
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
