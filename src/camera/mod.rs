//! Camera capture component.
//!
//! - Device access via [`MediaDevices`] / [`MediaStream`] ([`FfmpegDevices`] for real cameras)
//! - Still photos via [`capture_still`]
//! - Chunked video recording via [`VideoRecorder`]
//! - Session control via [`CaptureController`]

mod codec;
mod controller;
mod device;
mod errors;
mod ffmpeg;
mod recorder;
mod still;
mod types;

pub use codec::{has_audio_codec, recording_file_name, select_mime_type, PREFERRED_VIDEO_TYPES, UNCONSTRAINED_MIME_TYPE};
pub use controller::{format_elapsed, CaptureController, CaptureSettings};
pub use device::{classify_device_error, classify_ffmpeg_failure, MediaDevices, MediaStream, MediaTrack, TrackKind};
pub use errors::{CaptureError, DeviceError, Locale, RecorderError};
pub use ffmpeg::{default_device, default_input_format, FfmpegDevices, FfmpegEncoderBackend, FfmpegStream};
pub use recorder::{
    ChunkEncoder, EncoderBackend, EncoderEvent, RecordingOutcome, VideoRecorder, DEFAULT_FINALIZE_TIMEOUT,
    DEFAULT_TIMESLICE,
};
pub use still::{capture_still, encode_still, JPEG_QUALITY, PHOTO_FILE_NAME, PHOTO_MIME_TYPE};
pub use types::{
    blob_handle, data_url, latest_frame, new_frame_buffer, CaptureMode, CapturedMedia, FacingMode, Frame, FrameBuffer,
    FrameFormat, MediaKind, Resolution, StreamConstraints,
};
