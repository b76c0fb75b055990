//! ffmpeg-backed camera and encoder.
//!
//! Camera frames come from an `ffmpeg` child reading v4l2 (Linux) or
//! AVFoundation (macOS) and writing raw RGB24 to stdout. Recordings pipe the
//! latest frames back into a second `ffmpeg` child that writes WebM (or
//! Matroska) to stdout in timeslice-sized chunks.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use super::codec::{codecs, container, UNCONSTRAINED_MIME_TYPE};
use super::device::{classify_ffmpeg_failure, MediaDevices, MediaStream, MediaTrack};
use super::errors::{DeviceError, RecorderError};
use super::recorder::{ChunkEncoder, EncoderBackend, EncoderEvent};
use super::types::{new_frame_buffer, FacingMode, Frame, FrameBuffer, Resolution, StreamConstraints};

/// How long to wait for the first frame before giving up on a device.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Read size for encoder output.
const READ_CHUNK: usize = 64 * 1024;

/// Input format ffmpeg should use for cameras on this platform.
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// Default device for each facing on this platform.
pub fn default_device(facing: FacingMode) -> &'static str {
    match (cfg!(target_os = "macos"), facing) {
        (true, FacingMode::Front) => "0",
        (true, FacingMode::Back) => "1",
        (false, FacingMode::Front) => "/dev/video0",
        (false, FacingMode::Back) => "/dev/video2",
    }
}

/// Collect a child's stderr on a background thread.
fn spawn_stderr_collector<R: Read + Send + 'static>(stderr: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text);
        }
        text
    })
}

fn spawn_error(binary: &Path, error: std::io::Error) -> String {
    if error.kind() == std::io::ErrorKind::NotFound {
        format!("ffmpeg not found at {}", binary.display())
    } else {
        format!("failed to run {}: {}", binary.display(), error)
    }
}

/// Camera access through an `ffmpeg` child process.
#[derive(Debug, Clone)]
pub struct FfmpegDevices {
    binary: PathBuf,
    input_format: String,
    front_device: String,
    back_device: String,
    first_frame_timeout: Duration,
}

impl Default for FfmpegDevices {
    fn default() -> Self {
        Self::new(
            "ffmpeg",
            default_device(FacingMode::Front),
            default_device(FacingMode::Back),
        )
    }
}

impl FfmpegDevices {
    pub fn new(binary: impl Into<PathBuf>, front_device: impl Into<String>, back_device: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            input_format: default_input_format().to_string(),
            front_device: front_device.into(),
            back_device: back_device.into(),
            first_frame_timeout: FIRST_FRAME_TIMEOUT,
        }
    }

    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    pub fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }

    pub fn device_for(&self, facing: FacingMode) -> &str {
        match facing {
            FacingMode::Front => &self.front_device,
            FacingMode::Back => &self.back_device,
        }
    }

    /// ffmpeg arguments for reading `device` as raw RGB24 on stdout.
    pub fn capture_args(&self, device: &str, constraints: &StreamConstraints) -> Vec<String> {
        let res = constraints.ideal_resolution;
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-framerate".to_string(),
            constraints.fps.to_string(),
            "-video_size".to_string(),
            res.to_string(),
            "-i".to_string(),
            device.to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", res.width, res.height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

impl MediaDevices for FfmpegDevices {
    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, DeviceError> {
        if constraints.audio {
            log::warn!("Microphone capture is not supported by the ffmpeg backend; recording without audio");
        }

        let device = self.device_for(constraints.facing).to_string();
        let args = self.capture_args(&device, constraints);
        log::debug!("Starting camera: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeviceError::other("ffmpeg", spawn_error(&self.binary, e)))?;

        let stderr = spawn_stderr_collector(child.stderr.take());
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DeviceError::other("ffmpeg", "stdout was not captured"));
        };

        let resolution = constraints.ideal_resolution;
        let buffer = new_frame_buffer();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let reader = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run_frame_reader(stdout, resolution, buffer, stop, ready_tx))
        };

        match ready_rx.recv_timeout(self.first_frame_timeout) {
            Ok(()) => {
                log::info!("Opened {} ({} camera) at {}", device, constraints.facing, resolution);
                Ok(Box::new(FfmpegStream {
                    child: Some(child),
                    reader: Some(reader),
                    stop,
                    buffer,
                    resolution,
                    fps: constraints.fps,
                    label: device,
                    live: true,
                }))
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                stop.store(true, Ordering::SeqCst);
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                Err(DeviceError::other(
                    "ffmpeg",
                    format!("no frame from {} within {:?}", device, self.first_frame_timeout),
                ))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = child.wait();
                let _ = reader.join();
                let stderr = stderr.join().unwrap_or_default();
                log::warn!("Camera {} failed to start: {}", device, stderr.trim());
                Err(classify_ffmpeg_failure(&stderr))
            }
        }
    }
}

/// Read fixed-size RGB24 frames into the shared buffer until EOF or stop.
fn run_frame_reader(
    mut stdout: ChildStdout,
    resolution: Resolution,
    buffer: FrameBuffer,
    stop: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<()>,
) {
    let mut ready = Some(ready_tx);
    let mut data = vec![0u8; resolution.rgb_frame_len()];

    while !stop.load(Ordering::Relaxed) {
        if stdout.read_exact(&mut data).is_err() {
            break;
        }
        if let Ok(mut guard) = buffer.lock() {
            *guard = Some(Frame::rgb(data.clone(), resolution.width, resolution.height));
        }
        if let Some(tx) = ready.take() {
            let _ = tx.send(());
        }
    }
}

/// A running ffmpeg camera capture.
pub struct FfmpegStream {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    buffer: FrameBuffer,
    resolution: Resolution,
    fps: u32,
    label: String,
    live: bool,
}

impl MediaStream for FfmpegStream {
    fn tracks(&self) -> Vec<MediaTrack> {
        let mut track = MediaTrack::video(self.label.clone());
        track.live = self.live;
        vec![track]
    }

    fn stop_tracks(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("Released camera {}", self.label);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.live = false;
    }

    fn frame_buffer(&self) -> FrameBuffer {
        Arc::clone(&self.buffer)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> u32 {
        self.fps
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Encoder backend that runs `ffmpeg` with libvpx.
pub struct FfmpegEncoderBackend {
    binary: PathBuf,
    encoders: OnceLock<HashSet<String>>,
}

impl std::fmt::Debug for FfmpegEncoderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoderBackend")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl FfmpegEncoderBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    /// Encoder names this ffmpeg build offers. Probed once.
    fn encoders(&self) -> &HashSet<String> {
        self.encoders.get_or_init(|| {
            match Command::new(&self.binary)
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .output()
            {
                Ok(output) => parse_encoder_list(&String::from_utf8_lossy(&output.stdout)),
                Err(e) => {
                    log::warn!("Could not probe ffmpeg encoders: {}", spawn_error(&self.binary, e));
                    HashSet::new()
                }
            }
        })
    }

    fn has(&self, encoder: &str) -> bool {
        self.encoders().contains(encoder)
    }

    /// Video encoder to use for a requested type.
    fn video_encoder_for(&self, mime_type: &str) -> Option<&'static str> {
        let wanted = codecs(mime_type);
        if wanted.iter().any(|c| c == "vp9") {
            Some("libvpx-vp9")
        } else if wanted.iter().any(|c| c == "vp8") {
            Some("libvpx")
        } else if self.has("libvpx") {
            Some("libvpx")
        } else if self.has("libvpx-vp9") {
            Some("libvpx-vp9")
        } else {
            None
        }
    }

    fn output_args(&self, mime_type: Option<&str>) -> (Vec<String>, String) {
        let Some(mime) = mime_type else {
            return (
                vec!["-f".to_string(), "matroska".to_string()],
                UNCONSTRAINED_MIME_TYPE.to_string(),
            );
        };

        let mut args = Vec::new();
        if let Some(encoder) = self.video_encoder_for(mime) {
            args.extend(["-c:v".to_string(), encoder.to_string()]);
            args.extend(["-deadline".to_string(), "realtime".to_string()]);
            args.extend(["-cpu-used".to_string(), "8".to_string()]);
        }
        args.extend(["-f".to_string(), "webm".to_string()]);
        (args, mime.to_string())
    }
}

/// Second column of `ffmpeg -encoders` rows, e.g. `libvpx-vp9`.
fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

impl EncoderBackend for FfmpegEncoderBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        if container(mime_type) != "video/webm" {
            return false;
        }
        let wanted = codecs(mime_type);
        if wanted.is_empty() {
            return self.has("libvpx") || self.has("libvpx-vp9");
        }
        wanted.iter().all(|codec| match codec.as_str() {
            "vp9" => self.has("libvpx-vp9"),
            "vp8" => self.has("libvpx"),
            // No microphone input, so audio codecs are never produced.
            _ => false,
        })
    }

    fn start(
        &self,
        stream: &dyn MediaStream,
        mime_type: Option<&str>,
        timeslice: Duration,
        events: UnboundedSender<EncoderEvent>,
    ) -> Result<Box<dyn ChunkEncoder>, RecorderError> {
        let resolution = stream.resolution();
        let fps = stream.fps().max(1);
        let (output_args, mime) = self.output_args(mime_type);

        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-video_size".to_string(),
            resolution.to_string(),
            "-framerate".to_string(),
            fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ];
        args.extend(output_args);
        args.push("-".to_string());
        log::debug!("Starting encoder: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecorderError::StartFailed(spawn_error(&self.binary, e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RecorderError::StartFailed("encoder pipes were not captured".to_string()));
        };
        let stderr = spawn_stderr_collector(child.stderr.take());

        let stop = Arc::new(AtomicBool::new(false));
        let child = Arc::new(Mutex::new(Some(child)));

        let feeder = {
            let stop = Arc::clone(&stop);
            let buffer = stream.frame_buffer();
            let frame_interval = Duration::from_secs(1) / fps;
            thread::spawn(move || run_frame_feeder(stdin, buffer, resolution, frame_interval, stop))
        };

        let chunker = {
            let child = Arc::clone(&child);
            thread::spawn(move || run_chunker(stdout, stderr, child, timeslice, events))
        };

        Ok(Box::new(FfmpegEncoder {
            mime_type: mime,
            stop,
            child,
            feeder: Some(feeder),
            chunker: Some(chunker),
        }))
    }
}

/// Write the latest frame to the encoder at a steady rate until stopped.
///
/// Dropping stdin on exit lets ffmpeg flush and close its output.
fn run_frame_feeder(
    mut stdin: std::process::ChildStdin,
    buffer: FrameBuffer,
    resolution: Resolution,
    frame_interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut next = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let frame = buffer.lock().ok().and_then(|guard| guard.clone());
        if let Some(frame) = frame {
            if frame.width == resolution.width
                && frame.height == resolution.height
                && stdin.write_all(&frame.data).is_err()
            {
                break;
            }
        }
        next += frame_interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

/// Forward encoder output in timeslice-sized chunks.
fn run_chunker(
    mut stdout: ChildStdout,
    stderr: JoinHandle<String>,
    child: Arc<Mutex<Option<Child>>>,
    timeslice: Duration,
    events: UnboundedSender<EncoderEvent>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut pending = Vec::new();
    let mut last_flush = Instant::now();

    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                if last_flush.elapsed() >= timeslice {
                    let _ = events.send(EncoderEvent::Data(std::mem::take(&mut pending)));
                    last_flush = Instant::now();
                }
            }
            Err(e) => {
                let _ = events.send(EncoderEvent::Error(e.to_string()));
                break;
            }
        }
    }
    if !pending.is_empty() {
        let _ = events.send(EncoderEvent::Data(pending));
    }

    let status = child
        .lock()
        .ok()
        .and_then(|mut guard| guard.take())
        .and_then(|mut c| c.wait().ok());
    let stderr = stderr.join().unwrap_or_default();

    if let Some(status) = status {
        if !status.success() {
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| format!("encoder exited with {}", status));
            let _ = events.send(EncoderEvent::Error(detail));
        }
    }
    let _ = events.send(EncoderEvent::Stopped);
}

struct FfmpegEncoder {
    mime_type: String,
    stop: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    feeder: Option<JoinHandle<()>>,
    chunker: Option<JoinHandle<()>>,
}

impl ChunkEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn request_stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.chunker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.is_active() {
            if let Ok(mut guard) = self.child.lock() {
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                }
            }
        }
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        // The chunker exits once the killed child closes stdout.
        self.chunker.take();
    }
}
