//! Scripted camera devices and encoders for driving the capture pipeline
//! without hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use civic_reporter::camera::{
    new_frame_buffer, ChunkEncoder, DeviceError, EncoderBackend, EncoderEvent, FacingMode, Frame, FrameBuffer,
    MediaDevices, MediaStream, MediaTrack, RecorderError, Resolution, StreamConstraints,
};

/// What happened to the fake camera, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Acquired { facing: FacingMode, audio: bool },
    Released { facing: FacingMode },
}

#[derive(Default)]
struct DeviceShared {
    events: Mutex<Vec<DeviceEvent>>,
    live: AtomicUsize,
    /// Set when a stream was requested while another one was still live
    overlapped: AtomicBool,
}

/// Camera that hands out [`FakeStream`]s and records acquire/release order.
#[derive(Clone)]
pub struct FakeDevices {
    shared: Arc<DeviceShared>,
    failures: Arc<Mutex<VecDeque<DeviceError>>>,
    resolution: Resolution,
    with_frame: bool,
    gate: Arc<Mutex<Option<std::sync::mpsc::Receiver<()>>>>,
    waiting: Arc<AtomicBool>,
}

impl Default for FakeDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            shared: Arc::default(),
            failures: Arc::default(),
            resolution: Resolution { width: 8, height: 6 },
            with_frame: true,
            gate: Arc::default(),
            waiting: Arc::default(),
        }
    }

    /// Streams start with an empty frame buffer.
    pub fn without_frames(mut self) -> Self {
        self.with_frame = false;
        self
    }

    /// Fail the next acquisition with `error`.
    pub fn fail_next(&self, error: DeviceError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    /// Block the next acquisition until the returned sender fires, like a
    /// camera that is slow to deliver its first frame.
    pub fn gate(&self) -> std::sync::mpsc::Sender<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        if let Ok(mut gate) = self.gate.lock() {
            *gate = Some(rx);
        }
        tx
    }

    /// True while an acquisition is parked on the gate.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.shared.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn acquisitions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Acquired { .. }))
            .count()
    }

    pub fn live_streams(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn overlapped(&self) -> bool {
        self.shared.overlapped.load(Ordering::SeqCst)
    }
}

impl MediaDevices for FakeDevices {
    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, DeviceError> {
        let gate = self.gate.lock().ok().and_then(|mut g| g.take());
        if let Some(rx) = gate {
            self.waiting.store(true, Ordering::SeqCst);
            let opened = rx.recv_timeout(Duration::from_secs(2));
            self.waiting.store(false, Ordering::SeqCst);
            if opened.is_err() {
                return Err(DeviceError::other("fake", "camera never opened"));
            }
        }

        if let Some(error) = self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            return Err(error);
        }

        if self.shared.live.fetch_add(1, Ordering::SeqCst) > 0 {
            self.shared.overlapped.store(true, Ordering::SeqCst);
        }
        if let Ok(mut events) = self.shared.events.lock() {
            events.push(DeviceEvent::Acquired {
                facing: constraints.facing,
                audio: constraints.audio,
            });
        }

        let buffer = new_frame_buffer();
        if self.with_frame {
            let Resolution { width, height } = self.resolution;
            let frame = Frame::rgb(vec![120; self.resolution.rgb_frame_len()], width, height);
            if let Ok(mut slot) = buffer.lock() {
                *slot = Some(frame);
            }
        }

        let mut tracks = vec![MediaTrack::video(format!("{} camera", constraints.facing))];
        if constraints.audio {
            tracks.push(MediaTrack::audio("microphone"));
        }

        Ok(Box::new(FakeStream {
            facing: constraints.facing,
            tracks,
            buffer,
            resolution: self.resolution,
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct FakeStream {
    facing: FacingMode,
    tracks: Vec<MediaTrack>,
    buffer: FrameBuffer,
    resolution: Resolution,
    shared: Arc<DeviceShared>,
}

impl FakeStream {
    /// A standalone live stream, not tied to any [`FakeDevices`].
    pub fn live(audio: bool) -> Self {
        let mut tracks = vec![MediaTrack::video("front camera")];
        if audio {
            tracks.push(MediaTrack::audio("microphone"));
        }
        let shared = DeviceShared::default();
        shared.live.store(1, Ordering::SeqCst);
        Self {
            facing: FacingMode::Front,
            tracks,
            buffer: new_frame_buffer(),
            resolution: Resolution { width: 8, height: 6 },
            shared: Arc::new(shared),
        }
    }
}

impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.clone()
    }

    fn stop_tracks(&mut self) {
        if !self.is_active() {
            return;
        }
        for track in &mut self.tracks {
            track.live = false;
        }
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut events) = self.shared.events.lock() {
            events.push(DeviceEvent::Released { facing: self.facing });
        }
    }

    fn frame_buffer(&self) -> FrameBuffer {
        Arc::clone(&self.buffer)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// How a fake encoder answers a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopBehavior {
    /// Flush the tail chunks, then report `Stopped`
    Finish,
    /// Flush, report an error, then `Stopped`
    FailThenFinish(String),
    /// Never answer
    Hang,
}

#[derive(Default)]
struct EncoderShared {
    starts: AtomicUsize,
    stops: AtomicUsize,
    active: AtomicBool,
    sender: Mutex<Option<UnboundedSender<EncoderEvent>>>,
    requested_mime: Mutex<Option<Option<String>>>,
}

/// Encoder backend whose output is scripted by the test.
#[derive(Clone)]
pub struct FakeEncoderBackend {
    supported: Vec<String>,
    tail: Vec<Vec<u8>>,
    on_stop: StopBehavior,
    start_error: Option<RecorderError>,
    shared: Arc<EncoderShared>,
}

impl Default for FakeEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEncoderBackend {
    /// Supports only `video/webm`, flushes nothing, finishes cleanly.
    pub fn new() -> Self {
        Self {
            supported: vec!["video/webm".to_string()],
            tail: Vec::new(),
            on_stop: StopBehavior::Finish,
            start_error: None,
            shared: Arc::default(),
        }
    }

    pub fn supporting(mut self, types: &[&str]) -> Self {
        self.supported = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Chunks flushed in response to a stop request.
    pub fn with_tail(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.tail = chunks;
        self
    }

    pub fn on_stop(mut self, behavior: StopBehavior) -> Self {
        self.on_stop = behavior;
        self
    }

    pub fn failing_start(mut self, error: RecorderError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Push an event as the running encoder would.
    pub fn emit(&self, event: EncoderEvent) {
        if let Some(tx) = self.shared.sender.lock().ok().and_then(|s| s.clone()) {
            let _ = tx.send(event);
        }
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stop_requests(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// MIME type the recorder asked for on the last start.
    pub fn requested_mime(&self) -> Option<Option<String>> {
        self.shared.requested_mime.lock().ok().and_then(|m| m.clone())
    }
}

impl EncoderBackend for FakeEncoderBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn start(
        &self,
        _stream: &dyn MediaStream,
        mime_type: Option<&str>,
        _timeslice: Duration,
        events: UnboundedSender<EncoderEvent>,
    ) -> Result<Box<dyn ChunkEncoder>, RecorderError> {
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }

        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        self.shared.active.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.shared.requested_mime.lock() {
            *slot = Some(mime_type.map(str::to_string));
        }
        if let Ok(mut slot) = self.shared.sender.lock() {
            *slot = Some(events.clone());
        }

        Ok(Box::new(FakeEncoder {
            mime_type: mime_type.unwrap_or("video/x-matroska").to_string(),
            events,
            tail: self.tail.clone(),
            on_stop: self.on_stop.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeEncoder {
    mime_type: String,
    events: UnboundedSender<EncoderEvent>,
    tail: Vec<Vec<u8>>,
    on_stop: StopBehavior,
    shared: Arc<EncoderShared>,
}

impl ChunkEncoder for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn request_stop(&mut self) {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stops.fetch_add(1, Ordering::SeqCst);

        for chunk in self.tail.drain(..) {
            let _ = self.events.send(EncoderEvent::Data(chunk));
        }
        match &self.on_stop {
            StopBehavior::Finish => {
                let _ = self.events.send(EncoderEvent::Stopped);
            }
            StopBehavior::FailThenFinish(message) => {
                let _ = self.events.send(EncoderEvent::Error(message.clone()));
                let _ = self.events.send(EncoderEvent::Stopped);
            }
            StopBehavior::Hang => {}
        }
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }
}

/// Serve `state` on an ephemeral port and return its base URL.
pub async fn spawn_server(state: civic_reporter::server::AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(civic_reporter::server::serve_on(
        listener,
        Arc::new(state),
        civic_reporter::server::DEFAULT_BODY_LIMIT,
    ));
    format!("http://{}", addr)
}
