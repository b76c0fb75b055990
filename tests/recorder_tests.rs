//! Video recorder state machine tests against a scripted encoder.

mod support;

use std::sync::Arc;
use std::time::Duration;

use civic_reporter::camera::{
    has_audio_codec, EncoderEvent, MediaKind, MediaStream, RecorderError, RecordingOutcome, VideoRecorder,
};
use support::{FakeEncoderBackend, FakeStream, StopBehavior};

fn recorder(backend: &FakeEncoderBackend) -> VideoRecorder {
    VideoRecorder::new(Arc::new(backend.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_chunks_assembled_in_arrival_order() {
    let backend = FakeEncoderBackend::new().with_tail(vec![b"-tail".to_vec()]);
    let mut recorder = recorder(&backend);
    let stream = FakeStream::live(true);

    recorder.start(&stream).unwrap();
    assert!(recorder.is_recording());
    assert_eq!(recorder.mime_type(), Some("video/webm"));

    backend.emit(EncoderEvent::Data(b"head".to_vec()));
    backend.emit(EncoderEvent::Data(Vec::new()));
    backend.emit(EncoderEvent::Data(b"-body".to_vec()));
    assert!(recorder.pump().is_none(), "data alone must not end the recording");

    match recorder.stop().await.unwrap() {
        RecordingOutcome::Finalized(media) => {
            assert_eq!(media.payload(), b"head-body-tail");
            assert_eq!(media.kind(), MediaKind::Video);
            assert_eq!(media.mime_type(), "video/webm");
            assert_eq!(media.file_name(), "camera-recording.webm");
        }
        other => panic!("expected finalized recording, got {:?}", other),
    }
    assert!(!recorder.is_recording());
    assert_eq!(backend.stop_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_prefers_vp9_when_supported() {
    let backend = FakeEncoderBackend::new()
        .supporting(&["video/webm;codecs=vp9,opus", "video/webm"])
        .with_tail(vec![vec![1]]);
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    assert_eq!(
        backend.requested_mime(),
        Some(Some("video/webm;codecs=vp9,opus".to_string()))
    );
    recorder.abort();
}

#[tokio::test(start_paused = true)]
async fn test_video_only_stream_skips_audio_codecs() {
    let backend = FakeEncoderBackend::new()
        .supporting(&["video/webm;codecs=vp9,opus", "video/webm;codecs=vp8,opus", "video/webm"])
        .with_tail(vec![vec![3]]);
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(false)).unwrap();
    assert_eq!(backend.requested_mime(), Some(Some("video/webm".to_string())));

    match recorder.stop().await.unwrap() {
        RecordingOutcome::Finalized(media) => {
            assert_eq!(media.mime_type(), "video/webm");
            assert!(!has_audio_codec(media.mime_type()));
        }
        other => panic!("expected finalized recording, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_types_let_encoder_choose() {
    let backend = FakeEncoderBackend::new().supporting(&[]).with_tail(vec![vec![7, 7]]);
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(false)).unwrap();
    assert_eq!(backend.requested_mime(), Some(None));

    match recorder.stop().await.unwrap() {
        RecordingOutcome::Finalized(media) => {
            assert_eq!(media.mime_type(), "video/x-matroska");
            assert_eq!(media.file_name(), "camera-recording.mkv");
        }
        other => panic!("expected finalized recording, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording_is_an_error() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    backend.emit(EncoderEvent::Data(Vec::new()));

    assert_eq!(
        recorder.stop().await.unwrap(),
        RecordingOutcome::Aborted {
            error: RecorderError::EmptyRecording,
            partial: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_encoder_error_keeps_partial_recording() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    backend.emit(EncoderEvent::Data(b"first".to_vec()));
    backend.emit(EncoderEvent::Error("disk full".to_string()));

    match recorder.pump() {
        Some(RecordingOutcome::Aborted {
            error,
            partial: Some(media),
        }) => {
            assert_eq!(error, RecorderError::EncoderFailed("disk full".to_string()));
            assert_eq!(media.payload(), b"first");
        }
        other => panic!("expected aborted recording with partial data, got {:?}", other),
    }
    assert!(!recorder.is_recording());
    assert!(!backend.is_active(), "encoder must be asked to stop");
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_stop_ends_recording() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    backend.emit(EncoderEvent::Stopped);

    match recorder.pump() {
        Some(RecordingOutcome::Aborted { error, partial: None }) => {
            assert!(matches!(error, RecorderError::EncoderFailed(_)));
        }
        other => panic!("expected aborted recording, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_error_during_finalize_returns_partial() {
    let backend = FakeEncoderBackend::new()
        .with_tail(vec![b"flushed".to_vec()])
        .on_stop(StopBehavior::FailThenFinish("muxer crashed".to_string()));
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    match recorder.stop().await.unwrap() {
        RecordingOutcome::Aborted {
            error,
            partial: Some(media),
        } => {
            assert_eq!(error, RecorderError::EncoderFailed("muxer crashed".to_string()));
            assert_eq!(media.payload(), b"flushed");
        }
        other => panic!("expected aborted recording with partial data, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_encoder_times_out() {
    let backend = FakeEncoderBackend::new().on_stop(StopBehavior::Hang);
    let mut recorder = recorder(&backend).with_finalize_timeout(Duration::from_secs(2));

    recorder.start(&FakeStream::live(true)).unwrap();
    backend.emit(EncoderEvent::Data(b"partial".to_vec()));

    match recorder.stop().await.unwrap() {
        RecordingOutcome::Aborted {
            error: RecorderError::EncoderFailed(message),
            partial: Some(media),
        } => {
            assert!(message.contains("did not finish"));
            assert_eq!(media.payload(), b"partial");
        }
        other => panic!("expected timed-out recording, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_timer_ticks_and_stops() {
    let backend = FakeEncoderBackend::new().with_tail(vec![vec![0]]);
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    assert_eq!(recorder.elapsed_secs(), 0);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(recorder.elapsed_secs(), 3);

    recorder.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(recorder.elapsed_secs(), 3, "timer must be cancelled on stop");
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_resets_on_new_recording() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);

    recorder.start(&FakeStream::live(true)).unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    recorder.abort();
    assert_eq!(recorder.elapsed_secs(), 2);

    recorder.start(&FakeStream::live(true)).unwrap();
    assert_eq!(recorder.elapsed_secs(), 0);
    recorder.abort();
}

#[tokio::test(start_paused = true)]
async fn test_drop_tears_down_encoder_and_timer() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);
    let counter = recorder.elapsed_counter();

    recorder.start(&FakeStream::live(true)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    drop(recorder);

    assert!(!backend.is_active());
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_start_rejects_invalid_states() {
    let backend = FakeEncoderBackend::new();
    let mut recorder = recorder(&backend);

    let mut dead = FakeStream::live(true);
    dead.stop_tracks();
    assert_eq!(recorder.start(&dead), Err(RecorderError::NoVideoTrack));

    let stream = FakeStream::live(false);
    recorder.start(&stream).unwrap();
    assert_eq!(recorder.start(&stream), Err(RecorderError::AlreadyRecording));
    assert_eq!(backend.starts(), 1);
    recorder.abort();

    assert_eq!(recorder.stop().await, Err(RecorderError::NotRecording));
}

#[tokio::test]
async fn test_start_failure_leaves_recorder_idle() {
    let backend = FakeEncoderBackend::new().failing_start(RecorderError::StartFailed("no encoder".to_string()));
    let mut recorder = recorder(&backend);

    assert_eq!(
        recorder.start(&FakeStream::live(true)),
        Err(RecorderError::StartFailed("no encoder".to_string()))
    );
    assert!(!recorder.is_recording());
}
