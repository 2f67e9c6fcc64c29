//! End-to-end capture through the synthetic backend

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use live_scope::audio::{SessionState, SyntheticBackend, Waveform};
use live_scope::config::{AppConfig, CaptureConfig};
use live_scope::{ErrorKind, ScopeController};

fn ramp_backend(block_frames: usize) -> Arc<SyntheticBackend> {
    Arc::new(
        SyntheticBackend::new()
            .with_waveform(Waveform::Ramp)
            .with_block_frames(block_frames)
            .with_period(Duration::from_millis(1)),
    )
}

/// Tick until `frames` frames were signalled or the timeout passes
fn tick_frames(scope: &mut ScopeController, frames: usize, timeout: Duration) -> Vec<Vec<f32>> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while seen.len() < frames && Instant::now() < deadline {
        scope.tick(&mut |snapshot: &[f32]| seen.push(snapshot.to_vec()));
        thread::sleep(Duration::from_millis(5));
    }
    seen
}

#[test]
fn window_fills_with_most_recent_downsampled_samples() {
    let backend = ramp_backend(32);
    // 10 ms at 8 kHz, every 2nd frame: 40 samples
    let config = CaptureConfig {
        sample_rate: 8000,
        window_length_ms: 10,
        downsample_factor: 2,
        ..CaptureConfig::default()
    };
    let mut scope = ScopeController::new(backend, config, 20).unwrap();
    assert_eq!(scope.display_len(), 40);

    scope.start().unwrap();
    let frames = tick_frames(&mut scope, 3, Duration::from_secs(3));
    scope.stop();

    assert!(frames.len() >= 3);
    let last = frames.last().unwrap();
    assert_eq!(last.len(), 40);

    // Ramp values spaced by the stride; dropped blocks only widen a gap
    let written: Vec<f32> = last.iter().copied().skip_while(|&s| s == 0.0).collect();
    assert!(!written.is_empty());
    for pair in written.windows(2) {
        let step = pair[1] - pair[0];
        assert!(step > 0.0 && step % 2.0 == 0.0, "unexpected step {}", step);
    }
    assert!(written.windows(2).any(|pair| pair[1] - pair[0] == 2.0));
    assert_eq!(scope.session_state(), SessionState::Idle);
}

#[test]
fn reconfiguration_under_load_never_mixes_generations() {
    let backend = ramp_backend(64);
    let mut scope = ScopeController::new(backend.clone(), CaptureConfig::default(), 20).unwrap();
    scope.start().unwrap();
    tick_frames(&mut scope, 2, Duration::from_secs(3));

    scope.set_downsample(4).unwrap();
    assert!(scope.snapshot().iter().all(|&s| s == 0.0));
    assert_eq!(scope.display_len(), 11025);

    let frames = tick_frames(&mut scope, 2, Duration::from_secs(3));
    let last = frames.last().expect("frames after reconfiguration");
    let written: Vec<f32> = last.iter().copied().skip_while(|&s| s == 0.0).collect();
    for pair in written.windows(2) {
        let step = pair[1] - pair[0];
        assert!(step > 0.0 && step % 4.0 == 0.0, "unexpected step {}", step);
    }
    assert!(written.windows(2).any(|pair| pair[1] - pair[0] == 4.0));

    scope.set_sample_rate(22050).unwrap();
    assert_eq!(scope.session_state(), SessionState::Running);
    assert_eq!(backend.opened_count(), 2);
    assert_eq!(backend.live_streams(), 1);
    scope.stop();
    assert_eq!(backend.live_streams(), 0);
}

#[test]
fn controller_from_app_config() {
    let app = AppConfig::from_toml_str(
        r#"
        [capture]
        sample_rate = 16000
        window_length_ms = 250
        device_id = "synthetic:secondary"

        [queue]
        capacity = 4
        "#,
    )
    .unwrap();

    let backend = ramp_backend(16);
    let mut scope = ScopeController::from_app_config(backend, &app).unwrap();
    assert_eq!(scope.display_len(), 4000);
    assert_eq!(scope.queue_stats().capacity, 4);

    scope.start().unwrap();
    assert_eq!(
        scope.bound_device().map(|d| d.id.as_str()),
        Some("synthetic:secondary")
    );
    scope.stop();
}

#[test]
fn missing_configured_device_fails_start() {
    let config = CaptureConfig {
        device_id: Some("input:gone".to_string()),
        ..CaptureConfig::default()
    };
    let mut scope = ScopeController::new(ramp_backend(16), config, 20).unwrap();

    let err = scope.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    assert_eq!(scope.session_state(), SessionState::Idle);
}
