use std::{ffi::OsString, path::PathBuf};

use tracing::{info, warn};

/// Tools that must both be present before the server asks the engine to
/// merge streams or re-encode audio.
pub const TRANSCODE_TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityState {
    pub transcode_available: bool,
}

/// Looks up the transcoding tools on the search path.
///
/// A probe with `search_path: None` uses the process `PATH`. An explicit
/// search path is only useful to pin the outcome, e.g. in tests.
#[derive(Debug, Clone, Default)]
pub struct CapabilityProbe {
    search_path: Option<OsString>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    pub fn probe(&self) -> CapabilityState {
        let mut found = Vec::with_capacity(TRANSCODE_TOOLS.len());
        for tool in TRANSCODE_TOOLS {
            match self.locate(tool) {
                Some(path) => found.push(path),
                None => {
                    warn!(
                        "{tool} not detected; falling back to progressive formats (audio codec may not be MP3)."
                    );
                    return CapabilityState {
                        transcode_available: false,
                    };
                }
            }
        }

        info!("Transcoding tools detected at: {:?}", found);
        CapabilityState {
            transcode_available: true,
        }
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(tool, Some(paths), cwd).ok()
            }
            None => which::which(tool).ok(),
        }
    }
}
