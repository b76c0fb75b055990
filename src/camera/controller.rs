//! Capture UI controller: facing, capture mode and recording state for one
//! capture session.
//!
//! Every path that gives up the camera goes through [`CaptureController::teardown`],
//! so the stream, the encoder and the elapsed timer are released together.

use std::sync::Arc;
use std::time::Duration;

use super::device::{MediaDevices, MediaStream};
use super::errors::{CaptureError, DeviceError, Locale};
use super::recorder::{EncoderBackend, RecordingOutcome, VideoRecorder, DEFAULT_FINALIZE_TIMEOUT, DEFAULT_TIMESLICE};
use super::still::capture_still;
use super::types::{CaptureMode, CapturedMedia, FacingMode, Resolution, StreamConstraints};

/// Timing and device settings for a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub resolution: Resolution,
    pub fps: u32,
    /// Wait before the first acquisition
    pub acquire_delay: Duration,
    /// Wait between releasing one camera and opening the other
    pub facing_settle: Duration,
    /// Wait between releasing and reopening for a mode change
    pub mode_settle: Duration,
    pub timeslice: Duration,
    pub finalize_timeout: Duration,
    pub locale: Locale,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::HD,
            fps: 30,
            acquire_delay: Duration::from_millis(300),
            facing_settle: Duration::from_millis(500),
            mode_settle: Duration::from_millis(300),
            timeslice: DEFAULT_TIMESLICE,
            finalize_timeout: DEFAULT_FINALIZE_TIMEOUT,
            locale: Locale::default(),
        }
    }
}

/// Drives one capture session from mount to a terminal action.
pub struct CaptureController {
    devices: Arc<dyn MediaDevices>,
    settings: CaptureSettings,
    facing: FacingMode,
    mode: CaptureMode,
    stream: Option<Box<dyn MediaStream>>,
    recorder: VideoRecorder,
    error: Option<CaptureError>,
    ended: bool,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("facing", &self.facing)
            .field("mode", &self.mode)
            .field("ready", &self.is_ready())
            .field("recorder", &self.recorder)
            .field("error", &self.error)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl CaptureController {
    /// Open a session (front camera, photo mode) and acquire the camera
    /// after the acquisition delay.
    ///
    /// An acquisition failure does not fail the mount; it is kept as the
    /// session's error and [`retry`](Self::retry) can be used.
    pub async fn mount(
        devices: Arc<dyn MediaDevices>,
        encoder: Arc<dyn EncoderBackend>,
        settings: CaptureSettings,
    ) -> Self {
        let recorder = VideoRecorder::new(encoder)
            .with_timeslice(settings.timeslice)
            .with_finalize_timeout(settings.finalize_timeout);

        let mut controller = Self {
            devices,
            settings,
            facing: FacingMode::default(),
            mode: CaptureMode::default(),
            stream: None,
            recorder,
            error: None,
            ended: false,
        };

        tokio::time::sleep(controller.settings.acquire_delay).await;
        // Failure is recorded on the controller.
        let _ = controller.acquire().await;
        controller
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn locale(&self) -> Locale {
        self.settings.locale
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// True when a live video stream is attached.
    pub fn is_ready(&self) -> bool {
        !self.ended
            && self
                .stream
                .as_ref()
                .is_some_and(|s| s.has_live_video())
    }

    /// Facing and mode switches are only offered when ready and not recording.
    pub fn controls_enabled(&self) -> bool {
        self.is_ready() && !self.is_recording()
    }

    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    /// Localized message for the current error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| e.user_message(self.settings.locale))
    }

    /// Shared stream, for previewing frames.
    pub fn stream(&self) -> Option<&dyn MediaStream> {
        self.stream.as_deref()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.recorder.elapsed_secs()
    }

    /// Elapsed recording time as `MM:SS`.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.recorder.elapsed_secs())
    }

    pub fn recorder(&self) -> &VideoRecorder {
        &self.recorder
    }

    /// Switch between front and back cameras.
    pub async fn toggle_facing(&mut self) -> Result<(), CaptureError> {
        self.ensure_adjustable()?;
        self.release();
        tokio::time::sleep(self.settings.facing_settle).await;
        self.facing = self.facing.flipped();
        log::info!("Switched to {} camera", self.facing);
        self.acquire().await?;
        Ok(())
    }

    /// Switch between photo and video mode.
    pub async fn toggle_mode(&mut self) -> Result<(), CaptureError> {
        self.ensure_adjustable()?;
        self.release();
        tokio::time::sleep(self.settings.mode_settle).await;
        self.mode = self.mode.toggled();
        log::info!("Switched to {} mode", self.mode);
        self.acquire().await?;
        Ok(())
    }

    /// Try acquiring the camera again after a failure.
    pub async fn retry(&mut self) -> Result<(), CaptureError> {
        self.ensure_adjustable()?;
        self.error = None;
        self.release();
        tokio::time::sleep(self.settings.acquire_delay).await;
        self.acquire().await?;
        Ok(())
    }

    /// Snapshot the live frame. Ends the session when a photo was taken.
    ///
    /// `Ok(None)` means no frame was available yet.
    pub fn capture_photo(&mut self) -> Result<Option<CapturedMedia>, CaptureError> {
        self.ensure_open()?;
        if self.mode != CaptureMode::Photo {
            return Err(CaptureError::WrongMode {
                expected: CaptureMode::Photo,
            });
        }
        let Some(stream) = self.stream.as_ref() else {
            return Ok(None);
        };

        let media = capture_still(&stream.frame_buffer());
        if media.is_some() {
            self.end_session();
        }
        Ok(media)
    }

    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if self.mode != CaptureMode::Video {
            return Err(CaptureError::WrongMode {
                expected: CaptureMode::Video,
            });
        }
        let Some(stream) = self.stream.as_ref().filter(|s| s.has_live_video()) else {
            return Err(self.fail(CaptureError::NotReady));
        };

        match self.recorder.start(&**stream) {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Check for encoder failures while recording.
    ///
    /// Returns `Some` only when the recording ended on its own.
    pub fn poll(&mut self) -> Option<Result<CapturedMedia, CaptureError>> {
        let outcome = self.recorder.pump()?;
        Some(self.settle(outcome))
    }

    /// Stop recording and hand back the finished video.
    pub async fn stop_recording(&mut self) -> Result<CapturedMedia, CaptureError> {
        self.ensure_open()?;
        let outcome = self.recorder.stop().await?;
        self.settle(outcome)
    }

    /// End the session without a result.
    pub fn close(&mut self) {
        if !self.ended {
            log::info!("Closing capture session");
        }
        self.end_session();
    }

    fn settle(&mut self, outcome: RecordingOutcome) -> Result<CapturedMedia, CaptureError> {
        match outcome {
            RecordingOutcome::Finalized(media) => {
                self.end_session();
                Ok(media)
            }
            RecordingOutcome::Aborted {
                error,
                partial: Some(media),
            } => {
                log::warn!("Recording ended with an error, keeping partial video: {}", error);
                self.error = Some(error.into());
                self.end_session();
                Ok(media)
            }
            RecordingOutcome::Aborted { error, partial: None } => Err(self.fail(error.into())),
        }
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.ended {
            Err(CaptureError::SessionEnded)
        } else {
            Ok(())
        }
    }

    fn ensure_adjustable(&self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if self.is_recording() {
            return Err(CaptureError::ControlsLocked);
        }
        Ok(())
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        log::warn!("Capture error: {}", error);
        self.error = Some(error.clone());
        error
    }

    /// Release any held stream, then request a new one.
    async fn acquire(&mut self) -> Result<(), DeviceError> {
        self.release();

        let constraints = StreamConstraints::for_session(
            self.facing,
            self.mode,
            self.settings.resolution,
            self.settings.fps,
        );
        log::debug!("Requesting {} camera ({} mode, audio: {})", self.facing, self.mode, constraints.audio);

        match acquire_blocking(Arc::clone(&self.devices), constraints).await {
            Ok(stream) => {
                log::info!("Camera ready at {}", stream.resolution());
                self.stream = Some(stream);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone().into());
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
        }
    }

    fn teardown(&mut self) {
        self.recorder.abort();
        self.release();
    }

    fn end_session(&mut self) {
        self.teardown();
        self.ended = true;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// `MM:SS`, minutes not capped at 59.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Device backends may block for seconds while the camera warms up, so the
/// request runs on the blocking pool.
async fn acquire_blocking(
    devices: Arc<dyn MediaDevices>,
    constraints: StreamConstraints,
) -> Result<Box<dyn MediaStream>, DeviceError> {
    tokio::task::spawn_blocking(move || devices.get_user_media(&constraints))
        .await
        .map_err(|e| DeviceError::other("camera", format!("Camera request task failed: {}", e)))?
}
