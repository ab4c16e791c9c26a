use std::path::Path;

const MAX_FILENAME_CHARS: usize = 200;

/// Reduces a media title to characters that are safe in a filename.
///
/// Keeps alphanumerics plus space, `.`, `_` and `-`, collapses runs of
/// whitespace and caps the result at 200 characters.
pub fn sanitize_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|character| {
            character.is_alphanumeric() || matches!(character, ' ' | '.' | '_' | '-')
        })
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > MAX_FILENAME_CHARS {
        let mut truncated: String = collapsed.chars().take(MAX_FILENAME_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        collapsed
    }
}

const OCTET_STREAM: &str = "application/octet-stream";

/// MIME types for the containers the engine can leave behind.
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/ogg"),
];

pub fn media_type_for(filename: &str) -> &'static str {
    let Some(ext) = Path::new(filename).extension().and_then(|ext| ext.to_str()) else {
        return OCTET_STREAM;
    };
    MEDIA_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map_or(OCTET_STREAM, |&(_, media_type)| media_type)
}

/// `Content-Disposition` forcing a download. Browsers without RFC 5987
/// support fall back to the ASCII name.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback = ascii_fallback_name(filename);
    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

fn ascii_fallback_name(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .map(|character| match character {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | ' ' | '(' | ')' => character,
            _ => '_',
        })
        .collect();

    match replaced.trim() {
        "" => "download.bin".to_string(),
        trimmed => trimmed.to_string(),
    }
}
