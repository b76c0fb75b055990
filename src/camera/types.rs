//! Camera types and data structures.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use base64::Engine;
use sha2::{Digest, Sha256};

/// Which camera the session is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// User-facing ("selfie") camera
    #[default]
    Front,
    /// Environment-facing camera
    Back,
}

impl FacingMode {
    /// The other camera.
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Front => write!(f, "front"),
            FacingMode::Back => write!(f, "back"),
        }
    }
}

/// Whether the session takes stills or records video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Photo,
    Video,
}

impl CaptureMode {
    pub fn toggled(self) -> Self {
        match self {
            CaptureMode::Photo => CaptureMode::Video,
            CaptureMode::Video => CaptureMode::Photo,
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Photo => write!(f, "photo"),
            CaptureMode::Video => write!(f, "video"),
        }
    }
}

/// Camera resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 1280x720, the ideal size requested from every device
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    /// Number of bytes in one RGB24 frame at this resolution.
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What a caller asks of [`MediaDevices::get_user_media`](super::MediaDevices::get_user_media).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    /// Preferred size; backends may deliver something else
    pub ideal_resolution: Resolution,
    pub fps: u32,
    /// Request a microphone track alongside the camera
    pub audio: bool,
}

impl StreamConstraints {
    /// Constraints for a session in the given facing and capture mode.
    ///
    /// Audio is only requested when recording video.
    pub fn for_session(facing: FacingMode, mode: CaptureMode, resolution: Resolution, fps: u32) -> Self {
        Self {
            facing,
            ideal_resolution: resolution,
            fps,
            audio: mode == CaptureMode::Video,
        }
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Wrap raw RGB24 bytes.
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
        }
    }

    /// True when the buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * self.bytes_per_pixel()
    }
}

/// Latest frame shared between a stream's reader and its consumers.
pub type FrameBuffer = Arc<Mutex<Option<Frame>>>;

/// Create an empty shared frame buffer.
pub fn new_frame_buffer() -> FrameBuffer {
    Arc::new(Mutex::new(None))
}

/// Snapshot the latest frame in a buffer, if any.
pub fn latest_frame(buffer: &FrameBuffer) -> Option<Frame> {
    let guard = buffer.lock().ok()?;
    guard.clone()
}

/// Kind of artifact a capture produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Infer the kind from a MIME type; anything not `video/*` is an image.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Result of a successful photo capture or recording stop.
///
/// Immutable once built. Ownership moves to whoever receives it.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedMedia {
    payload: Vec<u8>,
    preview: String,
    kind: MediaKind,
    mime_type: String,
    file_name: String,
}

impl CapturedMedia {
    /// Build a capture result, deriving its preview handle from the payload.
    ///
    /// Images get an inline `data:` URL. Videos get a content-addressed
    /// `blob:` handle, since inlining them would be wasteful.
    pub fn new(payload: Vec<u8>, kind: MediaKind, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let preview = match kind {
            MediaKind::Image => data_url(&mime_type, &payload),
            MediaKind::Video => blob_handle(&payload),
        };
        Self {
            payload,
            preview,
            kind,
            mime_type,
            file_name: file_name.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take the payload bytes, dropping the rest of the record.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Debug for CapturedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedMedia")
            .field("kind", &self.kind)
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("bytes", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// `data:<mime>;base64,<payload>`
pub fn data_url(mime_type: &str, payload: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(payload)
    )
}

/// Content-addressed preview handle (first 16 bytes of SHA-256).
pub fn blob_handle(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let digest = hasher.finalize();
    format!("blob:civic-reporter/{}", hex::encode(&digest[..16]))
}
