//! Still-frame capture: snapshot the live frame as a JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::types::{CapturedMedia, Frame, FrameBuffer, MediaKind, latest_frame};

/// Fixed JPEG quality for stills.
pub const JPEG_QUALITY: u8 = 95;

pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

pub const PHOTO_FILE_NAME: &str = "camera-capture.jpg";

/// Capture whatever frame is currently in `buffer`.
///
/// Returns `None` when no frame has arrived yet; the caller treats that as
/// a no-op.
pub fn capture_still(buffer: &FrameBuffer) -> Option<CapturedMedia> {
    let frame = latest_frame(buffer)?;
    encode_still(&frame)
}

/// Encode one frame at its native resolution.
pub fn encode_still(frame: &Frame) -> Option<CapturedMedia> {
    if !frame.is_well_formed() {
        log::warn!(
            "Skipping still capture: {} bytes does not match {}x{} RGB",
            frame.data.len(),
            frame.width,
            frame.height
        );
        return None;
    }

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    if let Err(e) = encoder.encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8) {
        log::warn!("JPEG encoding failed: {}", e);
        return None;
    }

    log::debug!(
        "Captured {}x{} still ({} bytes)",
        frame.width,
        frame.height,
        jpeg.len()
    );

    Some(CapturedMedia::new(
        jpeg,
        MediaKind::Image,
        PHOTO_MIME_TYPE,
        PHOTO_FILE_NAME,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::new_frame_buffer;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(128);
            }
        }
        Frame::rgb(data, width, height)
    }

    #[test]
    fn test_empty_buffer_is_noop() {
        let buffer = new_frame_buffer();
        assert!(capture_still(&buffer).is_none());
    }

    #[test]
    fn test_malformed_frame_is_noop() {
        assert!(encode_still(&Frame::rgb(vec![0; 10], 4, 4)).is_none());
    }

    #[test]
    fn test_still_keeps_native_resolution() {
        let frame = gradient(64, 48);
        let media = encode_still(&frame).expect("frame should encode");

        assert_eq!(media.kind(), MediaKind::Image);
        assert_eq!(media.mime_type(), "image/jpeg");
        assert_eq!(media.file_name(), "camera-capture.jpg");
        assert!(media.preview().starts_with("data:image/jpeg;base64,"));

        let decoded = image::load_from_memory(media.payload()).expect("valid jpeg");
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_capture_uses_latest_frame() {
        let buffer = new_frame_buffer();
        *buffer.lock().unwrap() = Some(gradient(8, 8));
        *buffer.lock().unwrap() = Some(gradient(16, 8));

        let media = capture_still(&buffer).unwrap();
        let decoded = image::load_from_memory(media.payload()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
