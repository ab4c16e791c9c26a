use std::{io::ErrorKind, path::Path, time::SystemTime};

use tracing::{info, warn};

use crate::format::MediaKind;

/// Maps the engine's predicted filename onto what is actually in `dir`.
///
/// Returns `expected` when that file exists. Otherwise the newest file in
/// `dir` whose extension belongs to `kind` is returned, and if there is none
/// `expected` comes back unchanged so the miss surfaces when it is served.
pub async fn reconcile(expected: &str, kind: MediaKind, dir: &Path) -> String {
    match tokio::fs::metadata(dir.join(expected)).await {
        Ok(metadata) if metadata.is_file() => {
            info!("Downloaded file found: {expected}");
            return expected.to_string();
        }
        Ok(_) => warn!("Expected download is not a regular file: {expected}"),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            warn!("Expected file not found: {:?}", dir.join(expected));
        }
        Err(error) => warn!("Could not inspect expected file {expected}: {error}"),
    }

    match newest_matching_file(kind, dir).await {
        Some(candidate) => {
            info!("Using alternative {kind:?} file found: {candidate}");
            candidate
        }
        None => {
            warn!("No {kind:?} file found in {:?}; keeping {expected}", dir);
            expected.to_string()
        }
    }
}

async fn newest_matching_file(kind: MediaKind, dir: &Path) -> Option<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            warn!("Could not list {:?}: {error}", dir);
            return None;
        }
    };

    let mut newest: Option<(SystemTime, String)> = None;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate {:?}: {error}", dir);
                break;
            }
        };

        let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
            continue;
        };
        if !has_extension_of(kind, &name) {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        // Not every filesystem records birth time.
        let Ok(stamp) = metadata.created().or_else(|_| metadata.modified()) else {
            continue;
        };

        if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
            newest = Some((stamp, name));
        }
    }

    newest.map(|(_, name)| name)
}

fn has_extension_of(kind: MediaKind, name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| kind.extensions().contains(&ext.as_str()))
}
