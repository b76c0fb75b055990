//! Media device adapter: camera/microphone acquisition.

use super::errors::DeviceError;
use super::types::{FrameBuffer, Resolution, StreamConstraints};

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One track of an acquired stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
    /// False once the track has been stopped
    pub live: bool,
}

impl MediaTrack {
    pub fn video(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Video,
            label: label.into(),
            live: true,
        }
    }

    pub fn audio(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Audio,
            label: label.into(),
            live: true,
        }
    }
}

/// Source of camera streams.
///
/// Implementations hold the device exclusively between a successful
/// `get_user_media` and the matching [`MediaStream::stop_tracks`].
pub trait MediaDevices: Send + Sync {
    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, DeviceError>;
}

/// An acquired camera (+ optional microphone) stream.
pub trait MediaStream: Send {
    fn tracks(&self) -> Vec<MediaTrack>;

    /// Stop every track and release the underlying device. Idempotent.
    fn stop_tracks(&mut self);

    /// Shared buffer holding the most recent video frame.
    fn frame_buffer(&self) -> FrameBuffer;

    /// Resolution frames are actually delivered at.
    fn resolution(&self) -> Resolution;

    fn fps(&self) -> u32 {
        30
    }

    fn has_live_video(&self) -> bool {
        self.tracks()
            .iter()
            .any(|t| t.kind == TrackKind::Video && t.live)
    }

    fn has_live_audio(&self) -> bool {
        self.tracks()
            .iter()
            .any(|t| t.kind == TrackKind::Audio && t.live)
    }

    fn is_active(&self) -> bool {
        self.tracks().iter().any(|t| t.live)
    }
}

/// Classify a browser-style acquisition failure by its error name.
pub fn classify_device_error(name: &str, message: &str) -> DeviceError {
    match name {
        "NotReadableError" | "TrackStartError" => DeviceError::DeviceBusy,
        "AbortError" if is_busy_message(message) => DeviceError::DeviceBusy,
        "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => DeviceError::PermissionDenied,
        "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => DeviceError::NotFound,
        _ => DeviceError::other(name, message),
    }
}

/// Classify an ffmpeg device-open failure from its stderr output.
pub fn classify_ffmpeg_failure(stderr: &str) -> DeviceError {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied")
        || lower.contains("not authorized")
        || lower.contains("authorization")
    {
        DeviceError::PermissionDenied
    } else if is_busy_message(&lower) {
        DeviceError::DeviceBusy
    } else if lower.contains("no such file or directory")
        || lower.contains("could not find video device")
        || lower.contains("video device not found")
        || lower.contains("no such device")
    {
        DeviceError::NotFound
    } else {
        let last_line = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("ffmpeg exited before delivering a frame");
        DeviceError::other("ffmpeg", last_line.trim())
    }
}

fn is_busy_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("device or resource busy") || lower.contains("in use") || lower.contains("busy")
}
