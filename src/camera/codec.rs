//! Container/codec negotiation for recordings.

/// Recording types in order of preference.
pub const PREFERRED_VIDEO_TYPES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
];

/// MIME type reported when the encoder picks its own container.
pub const UNCONSTRAINED_MIME_TYPE: &str = "video/x-matroska";

pub const RECORDING_FILE_STEM: &str = "camera-recording";

/// Pick the first preferred type the encoder supports.
///
/// `None` means "let the encoder choose".
pub fn select_mime_type(is_supported: impl Fn(&str) -> bool) -> Option<&'static str> {
    PREFERRED_VIDEO_TYPES
        .iter()
        .copied()
        .find(|mime| is_supported(mime))
}

/// File name for a recording carrying `mime_type`.
pub fn recording_file_name(mime_type: &str) -> String {
    let extension = if container(mime_type) == "video/webm" {
        "webm"
    } else {
        "mkv"
    };
    format!("{}.{}", RECORDING_FILE_STEM, extension)
}

/// Container part of a MIME type (`video/webm;codecs=vp9` -> `video/webm`).
pub fn container(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

/// True when the `codecs=` parameter names an audio codec.
pub fn has_audio_codec(mime_type: &str) -> bool {
    codecs(mime_type)
        .iter()
        .any(|c| matches!(c.as_str(), "opus" | "vorbis" | "aac" | "mp4a"))
}

/// Codec list from a `codecs=` parameter, lowercased.
pub fn codecs(mime_type: &str) -> Vec<String> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
