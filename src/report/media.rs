//! Media attached to a report: a fresh capture or a file from disk.

use std::path::Path;

use crate::camera::{blob_handle, data_url, CapturedMedia, MediaKind};

use super::ReportError;

/// Media as the report flow carries it.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub kind: MediaKind,
    pub preview: String,
}

impl std::fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("kind", &self.kind)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl MediaFile {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let kind = MediaKind::from_mime(&mime_type);
        let preview = match kind {
            MediaKind::Image => data_url(&mime_type, &data),
            MediaKind::Video => blob_handle(&data),
        };
        Self {
            data,
            mime_type,
            file_name: file_name.into(),
            kind,
            preview,
        }
    }

    /// Read an image or video from disk, inferring its type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let mime_type = mime_from_path(path)
            .ok_or_else(|| ReportError::Media(format!("Unsupported media file: {}", path.display())))?;
        let data = std::fs::read(path)
            .map_err(|e| ReportError::Media(format!("Failed to read {}: {}", path.display(), e)))?;
        if data.is_empty() {
            return Err(ReportError::Media(format!("Media file is empty: {}", path.display())));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        Ok(Self::new(data, mime_type, file_name))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<CapturedMedia> for MediaFile {
    fn from(media: CapturedMedia) -> Self {
        let kind = media.kind();
        let mime_type = media.mime_type().to_string();
        let file_name = media.file_name().to_string();
        let preview = media.preview().to_string();
        Self {
            data: media.into_payload(),
            mime_type,
            file_name,
            kind,
            preview,
        }
    }
}

/// MIME type for a media file name, or `None` if it is neither image nor video.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime)
}
