//! Capture session tests: camera switching, recording locks and teardown.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use civic_reporter::camera::{
    CaptureController, CaptureError, CaptureMode, CaptureSettings, DeviceError, EncoderEvent, FacingMode, Locale,
    MediaKind, RecorderError,
};
use support::{DeviceEvent, FakeDevices, FakeEncoderBackend};

async fn mount(devices: &FakeDevices, backend: &FakeEncoderBackend) -> CaptureController {
    CaptureController::mount(
        Arc::new(devices.clone()),
        Arc::new(backend.clone()),
        CaptureSettings::default(),
    )
    .await
}

async fn mount_in_video(devices: &FakeDevices, backend: &FakeEncoderBackend) -> CaptureController {
    let mut controller = mount(devices, backend).await;
    controller.toggle_mode().await.unwrap();
    controller
}

#[tokio::test(start_paused = true)]
async fn test_mount_opens_front_camera_in_photo_mode() {
    let devices = FakeDevices::new();
    let controller = mount(&devices, &FakeEncoderBackend::new()).await;

    assert_eq!(controller.facing(), FacingMode::Front);
    assert_eq!(controller.mode(), CaptureMode::Photo);
    assert!(controller.is_ready());
    assert!(controller.controls_enabled());
    assert!(controller.error().is_none());
    assert_eq!(
        devices.events(),
        vec![DeviceEvent::Acquired {
            facing: FacingMode::Front,
            audio: false,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_mount_waits_before_acquiring() {
    let devices = FakeDevices::new();
    let started = tokio::time::Instant::now();
    let _controller = mount(&devices, &FakeEncoderBackend::new()).await;

    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_slow_camera_does_not_stall_other_tasks() {
    let devices = FakeDevices::new();
    let open = devices.gate();

    // Shares the single runtime thread with the mount below.
    let watcher = devices.clone();
    let opener = tokio::spawn(async move {
        while !watcher.is_waiting() {
            tokio::task::yield_now().await;
        }
        let _ = open.send(());
    });

    let settings = CaptureSettings {
        acquire_delay: Duration::ZERO,
        ..CaptureSettings::default()
    };
    let controller = CaptureController::mount(
        Arc::new(devices.clone()),
        Arc::new(FakeEncoderBackend::new()),
        settings,
    )
    .await;
    opener.await.unwrap();

    assert!(controller.is_ready());
    assert!(controller.error().is_none());
    assert_eq!(devices.acquisitions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_facing_releases_before_reacquiring() {
    let devices = FakeDevices::new();
    let mut controller = mount(&devices, &FakeEncoderBackend::new()).await;

    controller.toggle_facing().await.unwrap();
    assert_eq!(controller.facing(), FacingMode::Back);
    controller.toggle_facing().await.unwrap();
    assert_eq!(controller.facing(), FacingMode::Front);

    assert_eq!(
        devices.events(),
        vec![
            DeviceEvent::Acquired {
                facing: FacingMode::Front,
                audio: false
            },
            DeviceEvent::Released {
                facing: FacingMode::Front
            },
            DeviceEvent::Acquired {
                facing: FacingMode::Back,
                audio: false
            },
            DeviceEvent::Released {
                facing: FacingMode::Back
            },
            DeviceEvent::Acquired {
                facing: FacingMode::Front,
                audio: false
            },
        ]
    );
    assert!(!devices.overlapped());
    assert_eq!(devices.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_mode_requests_audio_for_video() {
    let devices = FakeDevices::new();
    let controller = mount_in_video(&devices, &FakeEncoderBackend::new()).await;

    assert_eq!(controller.mode(), CaptureMode::Video);
    assert_eq!(
        devices.events().last(),
        Some(&DeviceEvent::Acquired {
            facing: FacingMode::Front,
            audio: true,
        })
    );
    assert!(!devices.overlapped());
}

#[tokio::test(start_paused = true)]
async fn test_controls_locked_while_recording() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    assert!(controller.is_recording());
    assert!(!controller.controls_enabled());

    let acquisitions = devices.acquisitions();
    assert_eq!(controller.toggle_facing().await, Err(CaptureError::ControlsLocked));
    assert_eq!(controller.toggle_mode().await, Err(CaptureError::ControlsLocked));
    assert_eq!(controller.facing(), FacingMode::Front);
    assert_eq!(controller.mode(), CaptureMode::Video);
    assert_eq!(devices.acquisitions(), acquisitions);
    assert!(controller.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_stop_recording_returns_video_and_ends_session() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new().with_tail(vec![b"tail".to_vec()]);
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    backend.emit(EncoderEvent::Data(b"clip-".to_vec()));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(controller.poll().is_none());
    assert_eq!(controller.elapsed_display(), "00:02");

    let media = controller.stop_recording().await.unwrap();
    assert_eq!(media.kind(), MediaKind::Video);
    assert_eq!(media.payload(), b"clip-tail");

    assert!(controller.is_ended());
    assert!(!controller.is_recording());
    assert_eq!(devices.live_streams(), 0);
    assert_eq!(
        controller.stop_recording().await,
        Err(CaptureError::SessionEnded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_drop_while_recording_releases_everything() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    let counter = controller.recorder().elapsed_counter();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    drop(controller);

    assert!(!backend.is_active());
    assert_eq!(backend.stop_requests(), 1);
    assert_eq!(devices.live_streams(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_while_recording_discards_recording() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    backend.emit(EncoderEvent::Data(b"unused".to_vec()));
    controller.close();

    assert!(controller.is_ended());
    assert!(!controller.is_recording());
    assert!(!controller.is_ready());
    assert!(!backend.is_active());
    assert_eq!(devices.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_photo_capture_ends_session() {
    let devices = FakeDevices::new();
    let mut controller = mount(&devices, &FakeEncoderBackend::new()).await;

    let photo = controller.capture_photo().unwrap().expect("frame available");
    assert_eq!(photo.kind(), MediaKind::Image);
    assert_eq!(photo.mime_type(), "image/jpeg");
    assert_eq!(photo.file_name(), "camera-capture.jpg");
    assert!(!photo.is_empty());

    assert!(controller.is_ended());
    assert_eq!(devices.live_streams(), 0);
    assert_eq!(controller.capture_photo(), Err(CaptureError::SessionEnded));
}

#[tokio::test(start_paused = true)]
async fn test_photo_without_frame_is_a_noop() {
    let devices = FakeDevices::new().without_frames();
    let mut controller = mount(&devices, &FakeEncoderBackend::new()).await;

    assert_eq!(controller.capture_photo(), Ok(None));
    assert!(!controller.is_ended());
    assert!(controller.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_actions_require_matching_mode() {
    let devices = FakeDevices::new();
    let mut controller = mount(&devices, &FakeEncoderBackend::new()).await;

    assert_eq!(
        controller.start_recording(),
        Err(CaptureError::WrongMode {
            expected: CaptureMode::Video
        })
    );

    controller.toggle_mode().await.unwrap();
    assert_eq!(
        controller.capture_photo(),
        Err(CaptureError::WrongMode {
            expected: CaptureMode::Photo
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_failure_then_retry() {
    let devices = FakeDevices::new();
    devices.fail_next(DeviceError::DeviceBusy);
    let mut controller = mount(&devices, &FakeEncoderBackend::new()).await;

    assert!(!controller.is_ready());
    assert!(!controller.controls_enabled());
    assert_eq!(
        controller.error(),
        Some(&CaptureError::Device(DeviceError::DeviceBusy))
    );
    let message = controller.error_message().unwrap();
    assert!(message.contains("already in use"));

    controller.retry().await.unwrap();
    assert!(controller.is_ready());
    assert!(controller.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_error_message_follows_locale() {
    let devices = FakeDevices::new();
    devices.fail_next(DeviceError::PermissionDenied);
    let settings = CaptureSettings {
        locale: Locale::Hindi,
        ..CaptureSettings::default()
    };
    let controller = CaptureController::mount(
        Arc::new(devices.clone()),
        Arc::new(FakeEncoderBackend::new()),
        settings,
    )
    .await;

    let message = controller.error_message().unwrap();
    assert!(message.contains("कैमरा"));
}

#[tokio::test(start_paused = true)]
async fn test_encoder_failure_with_data_keeps_partial_video() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    backend.emit(EncoderEvent::Data(b"partial".to_vec()));
    backend.emit(EncoderEvent::Error("device unplugged".to_string()));

    match controller.poll() {
        Some(Ok(media)) => assert_eq!(media.payload(), b"partial"),
        other => panic!("expected partial video, got {:?}", other),
    }
    assert!(controller.is_ended());
    assert!(matches!(
        controller.error(),
        Some(CaptureError::Recorder(RecorderError::EncoderFailed(_)))
    ));
    assert_eq!(devices.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_encoder_failure_without_data_allows_another_try() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    backend.emit(EncoderEvent::Error("device unplugged".to_string()));

    assert!(matches!(controller.poll(), Some(Err(CaptureError::Recorder(_)))));
    assert!(!controller.is_ended());
    assert!(!controller.is_recording());
    assert!(controller.controls_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording_reports_error() {
    let devices = FakeDevices::new();
    let backend = FakeEncoderBackend::new();
    let mut controller = mount_in_video(&devices, &backend).await;

    controller.start_recording().unwrap();
    assert_eq!(
        controller.stop_recording().await,
        Err(CaptureError::Recorder(RecorderError::EmptyRecording))
    );
    assert!(!controller.is_ended());
}
