//! Video recorder: wraps a chunked encoder in an explicit state machine.
//!
//! ```text
//! Idle --start--> Recording --stop--> Idle (finalized)
//!                     |
//!                     +--encoder error / abort--> Idle (aborted)
//! ```
//!
//! While recording, the encoder pushes [`EncoderEvent`]s over a channel and
//! an owned timer task counts elapsed seconds. Both are torn down on every
//! exit path, including `Drop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::codec::{has_audio_codec, recording_file_name, select_mime_type};
use super::device::MediaStream;
use super::errors::RecorderError;
use super::types::{CapturedMedia, MediaKind};

/// Interval at which the encoder flushes buffered data.
pub const DEFAULT_TIMESLICE: Duration = Duration::from_millis(100);

/// How long `stop` waits for the encoder to flush and report `Stopped`.
pub const DEFAULT_FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

const TICK: Duration = Duration::from_secs(1);

/// Events pushed by a running encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A chunk of encoded output. May be empty.
    Data(Vec<u8>),
    /// The encoder hit an unrecoverable error.
    Error(String),
    /// The encoder flushed everything and will send nothing more.
    Stopped,
}

/// Factory for streaming encoders.
pub trait EncoderBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Start encoding `stream`.
    ///
    /// `mime_type` of `None` lets the backend pick its own container.
    fn start(
        &self,
        stream: &dyn MediaStream,
        mime_type: Option<&str>,
        timeslice: Duration,
        events: UnboundedSender<EncoderEvent>,
    ) -> Result<Box<dyn ChunkEncoder>, RecorderError>;
}

/// Handle to one running encoder.
pub trait ChunkEncoder: Send {
    /// MIME type of the produced data.
    fn mime_type(&self) -> &str;

    /// Ask the encoder to flush and finish. It answers with
    /// [`EncoderEvent::Stopped`]. Must be safe to call more than once.
    fn request_stop(&mut self);

    fn is_active(&self) -> bool;
}

/// How a recording ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Finalized(CapturedMedia),
    Aborted {
        error: RecorderError,
        /// Best-effort assembly of whatever arrived before the failure
        partial: Option<CapturedMedia>,
    },
}

/// Seconds counter driven by a tokio task. Aborted on drop.
struct ElapsedTimer {
    handle: JoinHandle<()>,
}

impl ElapsedTimer {
    fn start(runtime: &tokio::runtime::Handle, counter: Arc<AtomicU64>) -> Self {
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
            loop {
                ticker.tick().await;
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
        Self { handle }
    }

    fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct ActiveRecording {
    encoder: Box<dyn ChunkEncoder>,
    events: UnboundedReceiver<EncoderEvent>,
    chunks: Vec<Vec<u8>>,
    mime_type: String,
    timer: ElapsedTimer,
}

impl ActiveRecording {
    fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Concatenate chunks in arrival order.
    fn assemble(&self) -> Option<CapturedMedia> {
        if self.chunks.is_empty() {
            return None;
        }
        let payload = self.chunks.concat();
        Some(CapturedMedia::new(
            payload,
            MediaKind::Video,
            self.mime_type.clone(),
            recording_file_name(&self.mime_type),
        ))
    }

    fn shut_down(&mut self) {
        self.timer.cancel();
        if self.encoder.is_active() {
            self.encoder.request_stop();
        }
    }
}

enum Phase {
    Idle,
    Recording(ActiveRecording),
}

/// Records a [`MediaStream`] through an [`EncoderBackend`].
pub struct VideoRecorder {
    backend: Arc<dyn EncoderBackend>,
    timeslice: Duration,
    finalize_timeout: Duration,
    elapsed: Arc<AtomicU64>,
    phase: Phase,
}

impl std::fmt::Debug for VideoRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRecorder")
            .field("recording", &self.is_recording())
            .field("elapsed_secs", &self.elapsed_secs())
            .finish_non_exhaustive()
    }
}

impl VideoRecorder {
    pub fn new(backend: Arc<dyn EncoderBackend>) -> Self {
        Self {
            backend,
            timeslice: DEFAULT_TIMESLICE,
            finalize_timeout: DEFAULT_FINALIZE_TIMEOUT,
            elapsed: Arc::new(AtomicU64::new(0)),
            phase: Phase::Idle,
        }
    }

    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice = timeslice;
        self
    }

    pub fn with_finalize_timeout(mut self, timeout: Duration) -> Self {
        self.finalize_timeout = timeout;
        self
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording(_))
    }

    /// Whole seconds since the current (or last) recording started.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Shared handle to the elapsed-seconds counter.
    pub fn elapsed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.elapsed)
    }

    /// Negotiated MIME type of the running recording.
    pub fn mime_type(&self) -> Option<&str> {
        match &self.phase {
            Phase::Recording(active) => Some(&active.mime_type),
            Phase::Idle => None,
        }
    }

    /// Start recording `stream`. Must be called from within a tokio runtime.
    pub fn start(&mut self, stream: &dyn MediaStream) -> Result<(), RecorderError> {
        if self.is_recording() {
            return Err(RecorderError::AlreadyRecording);
        }
        if !stream.has_live_video() {
            return Err(RecorderError::NoVideoTrack);
        }
        let with_audio = stream.has_live_audio();
        if !with_audio {
            log::warn!("No audio track available, recording video only");
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RecorderError::StartFailed("no async runtime available".to_string()))?;

        // A type naming an audio codec would mislabel a video-only file.
        let requested =
            select_mime_type(|mime| (with_audio || !has_audio_codec(mime)) && self.backend.is_type_supported(mime));
        match requested {
            Some(mime) => log::info!("Recording with {}", mime),
            None => log::info!("No preferred recording type supported, letting encoder choose"),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let encoder = self.backend.start(stream, requested, self.timeslice, tx)?;
        let mime_type = encoder.mime_type().to_string();

        self.elapsed.store(0, Ordering::Relaxed);
        let timer = ElapsedTimer::start(&runtime, Arc::clone(&self.elapsed));

        self.phase = Phase::Recording(ActiveRecording {
            encoder,
            events: rx,
            chunks: Vec::new(),
            mime_type,
            timer,
        });
        Ok(())
    }

    /// Drain pending encoder events without blocking.
    ///
    /// Returns `Some` only when the recording ended on its own (an encoder
    /// error or an unexpected stop); the recorder is Idle afterwards.
    pub fn pump(&mut self) -> Option<RecordingOutcome> {
        let failure = {
            let Phase::Recording(active) = &mut self.phase else {
                return None;
            };
            loop {
                match active.events.try_recv() {
                    Ok(EncoderEvent::Data(chunk)) => active.push(chunk),
                    Ok(EncoderEvent::Error(message)) => break Some(RecorderError::EncoderFailed(message)),
                    Ok(EncoderEvent::Stopped) | Err(TryRecvError::Disconnected) => {
                        break Some(RecorderError::EncoderFailed(
                            "encoder stopped unexpectedly".to_string(),
                        ))
                    }
                    Err(TryRecvError::Empty) => break None,
                }
            }
        }?;

        log::error!("Recording failed: {}", failure);
        Some(self.abort_with(failure))
    }

    /// Stop recording and assemble the result.
    ///
    /// The elapsed timer is cancelled before anything else happens.
    pub async fn stop(&mut self) -> Result<RecordingOutcome, RecorderError> {
        let Phase::Recording(mut active) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return Err(RecorderError::NotRecording);
        };

        active.timer.cancel();
        active.encoder.request_stop();

        let drained = tokio::time::timeout(self.finalize_timeout, async {
            let mut failure = None;
            while let Some(event) = active.events.recv().await {
                match event {
                    EncoderEvent::Data(chunk) => active.push(chunk),
                    EncoderEvent::Error(message) => {
                        failure.get_or_insert(RecorderError::EncoderFailed(message));
                    }
                    EncoderEvent::Stopped => break,
                }
            }
            failure
        })
        .await;

        let failure = match drained {
            Ok(failure) => failure,
            Err(_) => {
                log::warn!(
                    "Encoder did not finalize within {:?}, keeping {} chunks",
                    self.finalize_timeout,
                    active.chunks.len()
                );
                Some(RecorderError::EncoderFailed(
                    "encoder did not finish in time".to_string(),
                ))
            }
        };

        if let Some(error) = failure {
            return Ok(RecordingOutcome::Aborted {
                partial: active.assemble(),
                error,
            });
        }

        match active.assemble() {
            Some(media) => {
                log::info!(
                    "Recording finalized: {} chunks, {} bytes, {}s",
                    active.chunks.len(),
                    media.len(),
                    self.elapsed_secs()
                );
                Ok(RecordingOutcome::Finalized(media))
            }
            None => {
                log::warn!("Recording stopped with no data");
                Ok(RecordingOutcome::Aborted {
                    error: RecorderError::EmptyRecording,
                    partial: None,
                })
            }
        }
    }

    /// Tear down any in-progress recording, discarding its data.
    pub fn abort(&mut self) {
        if let Phase::Recording(mut active) = std::mem::replace(&mut self.phase, Phase::Idle) {
            log::info!("Aborting recording after {}s", self.elapsed_secs());
            active.shut_down();
        }
    }

    fn abort_with(&mut self, error: RecorderError) -> RecordingOutcome {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording(mut active) => {
                active.shut_down();
                RecordingOutcome::Aborted {
                    partial: active.assemble(),
                    error,
                }
            }
            Phase::Idle => RecordingOutcome::Aborted { error, partial: None },
        }
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        self.abort();
    }
}
