//! Error types for capture operations.
//!
//! Each error has an English `Display` for logs and a localized
//! [`user_message`](DeviceError::user_message) for whoever drives the UI.

use super::types::CaptureMode;

/// Language for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    English,
    Hindi,
}

impl Locale {
    /// Parse a locale tag such as `en`, `hi` or `hi-IN`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.split(['-', '_']).next().unwrap_or_default().to_lowercase();
        match primary.as_str() {
            "en" | "english" => Some(Locale::English),
            "hi" | "hindi" => Some(Locale::Hindi),
            _ => None,
        }
    }
}

/// Why a camera/microphone stream could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera is already in use by another application")]
    DeviceBusy,

    #[error("No camera device found")]
    NotFound,

    #[error("Camera access failed ({name}): {message}")]
    Other { name: String, message: String },
}

impl DeviceError {
    pub fn other(name: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::Other {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Message suitable for showing to the person holding the camera.
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (DeviceError::DeviceBusy, Locale::English) => {
                "The camera is already in use or cannot be accessed. Please close other apps that are using the camera.".to_string()
            }
            (DeviceError::DeviceBusy, Locale::Hindi) => {
                "कैमरा पहले से उपयोग में है या एक्सेस नहीं किया जा सकता। कृपया अन्य ऐप्स बंद करें जो कैमरा का उपयोग कर रहे हैं।".to_string()
            }
            (DeviceError::PermissionDenied, Locale::English) => {
                "Camera access was not allowed. Please grant camera permission in your settings.".to_string()
            }
            (DeviceError::PermissionDenied, Locale::Hindi) => {
                "कैमरा एक्सेस की अनुमति नहीं दी गई। कृपया ब्राउज़र सेटिंग्स में कैमरा अनुमति दें।".to_string()
            }
            (DeviceError::NotFound, Locale::English) => {
                "No camera device was found. Please make sure your device has a camera.".to_string()
            }
            (DeviceError::NotFound, Locale::Hindi) => {
                "कोई कैमरा डिवाइस नहीं मिला। कृपया सुनिश्चित करें कि आपका डिवाइस कैमरा से लैस है।".to_string()
            }
            (DeviceError::Other { name, message }, Locale::English) => format!(
                "There was a problem accessing the camera ({}): {}. Please try again or use another device.",
                display_name(name),
                message
            ),
            (DeviceError::Other { name, message }, Locale::Hindi) => format!(
                "कैमरा एक्सेस करने में समस्या हुई ({}): {}। कृपया पुनः प्रयास करें या अन्य डिवाइस का उपयोग करें।",
                display_name(name),
                message
            ),
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "unknown error"
    } else {
        name
    }
}

/// Failures of the video recorder state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("Stream has no live video track")]
    NoVideoTrack,

    #[error("Failed to start encoder: {0}")]
    StartFailed(String),

    #[error("Recording produced no data")]
    EmptyRecording,

    #[error("Encoder failed during recording: {0}")]
    EncoderFailed(String),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,
}

impl RecorderError {
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (RecorderError::NoVideoTrack, Locale::English) => {
                "No video track is available. Please allow camera access.".to_string()
            }
            (RecorderError::NoVideoTrack, Locale::Hindi) => {
                "वीडियो ट्रैक उपलब्ध नहीं है। कृपया कैमरा एक्सेस की अनुमति दें।".to_string()
            }
            (RecorderError::StartFailed(msg), Locale::English) => {
                format!("There was a problem starting the video recording: {}.", msg)
            }
            (RecorderError::StartFailed(msg), Locale::Hindi) => {
                format!("वीडियो रिकॉर्डिंग शुरू करने में समस्या हुई: {}।", msg)
            }
            (RecorderError::EmptyRecording, Locale::English) => {
                "No recording data was received. Please try again.".to_string()
            }
            (RecorderError::EmptyRecording, Locale::Hindi) => {
                "रिकॉर्डिंग डेटा प्राप्त नहीं हुआ। कृपया पुनः प्रयास करें।".to_string()
            }
            (RecorderError::EncoderFailed(_), Locale::English) => {
                "An error occurred during recording. Please try again.".to_string()
            }
            (RecorderError::EncoderFailed(_), Locale::Hindi) => {
                "रिकॉर्डिंग के दौरान त्रुटि हुई। कृपया पुनः प्रयास करें।".to_string()
            }
            (RecorderError::AlreadyRecording, Locale::English) => {
                "A recording is already in progress.".to_string()
            }
            (RecorderError::AlreadyRecording, Locale::Hindi) => {
                "रिकॉर्डिंग पहले से चल रही है।".to_string()
            }
            (RecorderError::NotRecording, Locale::English) => "No recording is in progress.".to_string(),
            (RecorderError::NotRecording, Locale::Hindi) => "कोई रिकॉर्डिंग नहीं चल रही है।".to_string(),
        }
    }
}

/// Errors surfaced by the capture controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("Camera controls are locked while recording")]
    ControlsLocked,

    #[error("Action requires {expected} mode")]
    WrongMode { expected: CaptureMode },

    #[error("Camera is not ready")]
    NotReady,

    #[error("Capture session has ended")]
    SessionEnded,
}

impl CaptureError {
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (CaptureError::Device(e), _) => e.user_message(locale),
            (CaptureError::Recorder(e), _) => e.user_message(locale),
            (CaptureError::NotReady, Locale::English) => {
                "The camera is not ready. Please allow camera access and try again.".to_string()
            }
            (CaptureError::NotReady, Locale::Hindi) => {
                "कैमरा तैयार नहीं है। कृपया पेज को रिफ्रेश करें और कैमरा एक्सेस की अनुमति दें।".to_string()
            }
            (other, _) => other.to_string(),
        }
    }
}
