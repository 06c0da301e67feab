// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the frame pipeline and recording controller

use camwatch::config::{CameraSettings, RecordingMode};
use camwatch::errors::{MediaError, PipelineError};
use camwatch::media::writer::{MemoryCodecFactory, MemoryOptions};
use camwatch::media::{AudioCodec, HwPreference, MediaWriter, WriterOptions};
use camwatch::motion::DetectorKind;
use camwatch::pipelines::frame::{Anchor, FrameHook, FrameRegistry, HookMode};
use camwatch::pipelines::{FrameEvent, FramePipeline, ProcessedFrame, RecordingController};
use camwatch::Frame;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn settings(id: &str) -> CameraSettings {
    let mut settings = CameraSettings::new(id, "test://");
    settings.overlay.anchor = Anchor::Off;
    settings.motion.detector = DetectorKind::TwoFrames;
    settings.motion.suppress_noise = false;
    settings
}

fn solid(width: u32, height: u32, value: u8) -> Frame {
    Frame::from_rgb(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
}

fn drain(rx: &mut UnboundedReceiver<FrameEvent>) -> Vec<FrameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn detections(events: &[FrameEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, FrameEvent::Detect { .. }))
        .count()
}

#[test]
fn test_motion_emits_detect_and_latches() {
    let (mut pipeline, mut rx) = FramePipeline::new(settings("cam"));
    let handle = pipeline.handle();

    let first = pipeline.on_frame(solid(8, 8, 0)).unwrap();
    assert!(!first.motion);
    assert_eq!(detections(&drain(&mut rx)), 0);

    let second = pipeline.on_frame(solid(8, 8, 255)).unwrap();
    assert!(second.motion);
    assert!((second.level - 1.0).abs() < 1e-9);
    let events = drain(&mut rx);
    assert_eq!(detections(&events), 1);
    assert!(matches!(events.last(), Some(FrameEvent::Frame(_))));
    assert!(handle.motion_detected());

    // Reading the latch clears it
    assert!(handle.motion_recently_detected());

    let third = pipeline.on_frame(solid(8, 8, 255)).unwrap();
    assert!(!third.motion);
    assert!(!handle.motion_detected());
    assert!(!handle.motion_recently_detected());
}

#[test]
fn test_latch_survives_quiet_frame() {
    let (mut pipeline, _rx) = FramePipeline::new(settings("cam"));
    let handle = pipeline.handle();
    pipeline.on_frame(solid(8, 8, 0)).unwrap();
    pipeline.on_frame(solid(8, 8, 255)).unwrap();
    pipeline.on_frame(solid(8, 8, 255)).unwrap();

    // Motion ended but was never read
    assert!(!handle.motion_detected());
    assert!(handle.motion_recently_detected());
    assert!(!handle.motion_recently_detected());
}

#[test]
fn test_level_above_high_is_not_motion() {
    let mut s = settings("cam");
    s.alarm.high = 0.5;
    let (mut pipeline, mut rx) = FramePipeline::new(s);
    pipeline.on_frame(solid(8, 8, 0)).unwrap();
    let out = pipeline.on_frame(solid(8, 8, 255)).unwrap();
    assert!(!out.motion);
    assert_eq!(detections(&drain(&mut rx)), 0);
    assert!((pipeline.motion_level() - 1.0).abs() < 1e-9);
}

#[test]
fn test_gain_scales_level() {
    let mut s = settings("cam");
    s.alarm.gain = 0.5;
    s.alarm.low = 0.6;
    let (mut pipeline, _rx) = FramePipeline::new(s);
    pipeline.on_frame(solid(8, 8, 0)).unwrap();
    let out = pipeline.on_frame(solid(8, 8, 255)).unwrap();
    assert!((out.level - 0.5).abs() < 1e-9);
    assert!(!out.motion);
}

#[test]
fn test_processing_interval_skips_detection() {
    let mut s = settings("cam");
    s.alarm.processing_interval_ms = 60_000;
    let (mut pipeline, _rx) = FramePipeline::new(s.clone());
    pipeline.on_frame(solid(8, 8, 0)).unwrap();
    assert!(!pipeline.on_frame(solid(8, 8, 255)).unwrap().motion);

    // Calibration runs the detector on every frame
    s.alarm.calibrate = true;
    let (mut pipeline, _rx) = FramePipeline::new(s);
    pipeline.on_frame(solid(8, 8, 0)).unwrap();
    assert!(pipeline.on_frame(solid(8, 8, 255)).unwrap().motion);
}

struct InvertHook {
    calls: Arc<AtomicUsize>,
    alert: String,
    fail: bool,
}

impl FrameHook for InvertHook {
    fn process_frame(&mut self, frame: &RgbImage) -> Result<RgbImage, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Hook("model not loaded".into()));
        }
        self.alert = "person".into();
        let mut out = frame.clone();
        image::imageops::invert(&mut out);
        Ok(out)
    }

    fn alert(&self) -> String {
        self.alert.clone()
    }

    fn reset_alert(&mut self) {
        self.alert.clear();
    }
}

fn hook(calls: &Arc<AtomicUsize>, fail: bool) -> Box<dyn FrameHook> {
    Box::new(InvertHook {
        calls: Arc::clone(calls),
        alert: String::new(),
        fail,
    })
}

#[test]
fn test_hook_output_continues_through_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (pipeline, mut rx) = FramePipeline::new(settings("cam"));
    let mut pipeline = pipeline.with_hook(hook(&calls, false));

    let out = pipeline.on_frame(solid(4, 4, 10)).unwrap();
    assert_eq!(out.image.get_pixel(0, 0), &Rgb([245, 245, 245]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let alerts: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            FrameEvent::Alert(text) => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(alerts, vec!["person".to_string()]);
}

#[test]
fn test_hook_error_keeps_frame() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (pipeline, mut rx) = FramePipeline::new(settings("cam"));
    let mut pipeline = pipeline.with_hook(hook(&calls, true));

    let out = pipeline.on_frame(solid(4, 4, 10)).unwrap();
    assert_eq!(out.image.get_pixel(0, 0), &Rgb([10, 10, 10]));
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, FrameEvent::Error(_))));
    assert!(events.iter().any(|e| matches!(e, FrameEvent::Frame(_))));
}

struct PanickingHook;

impl FrameHook for PanickingHook {
    fn process_frame(&mut self, _frame: &RgbImage) -> Result<RgbImage, PipelineError> {
        panic!("detector crashed");
    }

    fn alert(&self) -> String {
        String::new()
    }

    fn reset_alert(&mut self) {}
}

#[test]
fn test_hook_panic_passes_frame_on() {
    let (pipeline, mut rx) = FramePipeline::new(settings("cam"));
    let mut pipeline = pipeline.with_hook(Box::new(PanickingHook));

    for _ in 0..2 {
        let out = pipeline.on_frame(solid(4, 4, 10)).unwrap();
        assert_eq!(out.image.get_pixel(0, 0), &Rgb([10, 10, 10]));
    }
    let events = drain(&mut rx);
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            FrameEvent::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("detector crashed"), "{}", errors[0]);
    assert_eq!(events.iter().filter(|e| matches!(e, FrameEvent::Frame(_))).count(), 2);
}

#[test]
fn test_trigger_hook_runs_once_per_trigger() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut s = settings("cam");
    s.hook_mode = HookMode::Trigger;
    let (pipeline, _rx) = FramePipeline::new(s);
    let mut pipeline = pipeline.with_hook(hook(&calls, false));
    let handle = pipeline.handle();

    pipeline.on_frame(solid(4, 4, 0)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    handle.trigger_hook();
    pipeline.on_frame(solid(4, 4, 0)).unwrap();
    pipeline.on_frame(solid(4, 4, 0)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_motion_hook_waits_for_motion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut s = settings("cam");
    s.hook_mode = HookMode::Motion;
    let (pipeline, _rx) = FramePipeline::new(s);
    let mut pipeline = pipeline.with_hook(hook(&calls, false));

    pipeline.on_frame(solid(4, 4, 0)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // Hook runs before detection, so the frame declaring motion is not hooked
    pipeline.on_frame(solid(4, 4, 255)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    pipeline.on_frame(solid(4, 4, 255)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_picture_in_picture_from_registry() {
    let registry = FrameRegistry::new();
    let (child, _child_rx) = FramePipeline::new(settings("child"));
    let mut child = child.with_registry(registry.clone());

    let mut parent_settings = settings("parent");
    parent_settings.pip = "child,0,0,50,50".into();
    let (parent, _parent_rx) = FramePipeline::new(parent_settings);
    let mut parent = parent.with_registry(registry.clone());

    child.on_frame(solid(8, 8, 255)).unwrap();
    let out = parent.on_frame(solid(8, 8, 0)).unwrap();
    assert_eq!(out.image.get_pixel(1, 1), &Rgb([255, 255, 255]));
    assert_eq!(out.image.get_pixel(6, 6), &Rgb([0, 0, 0]));

    // A failing child is left out
    child.on_source_error("stream lost".into());
    let out = parent.on_frame(solid(8, 8, 0)).unwrap();
    assert_eq!(out.image.get_pixel(1, 1), &Rgb([0, 0, 0]));
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn processed(width: u32, height: u32, motion: bool) -> ProcessedFrame {
    ProcessedFrame {
        image: Arc::new(RgbImage::new(width, height)),
        motion,
        level: if motion { 1.0 } else { 0.0 },
    }
}

fn recorder(
    mode: RecordingMode,
    dir: &std::path::Path,
) -> (RecordingController, MemoryCodecFactory) {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let writer = MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference: HwPreference::Software,
            ..WriterOptions::default()
        },
    );
    let mut camera = CameraSettings::new("yard", "test://");
    camera.recording.mode = mode;
    camera.recording.post_motion_secs = 10;
    camera.recording.max_record_secs = 0;
    (RecordingController::new(&camera, dir, writer), factory)
}

#[test]
fn test_records_while_motion_and_post_motion() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = recorder(RecordingMode::OnMotion, dir.path());

    rec.on_frame(&processed(6, 4, false), t0()).unwrap();
    assert!(!rec.is_recording());

    rec.on_frame(&processed(6, 4, true), t0() + TimeDelta::seconds(1)).unwrap();
    assert!(rec.is_recording());
    let path = rec.current_path().unwrap().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mkv"));

    rec.on_frame(&processed(6, 4, false), t0() + TimeDelta::seconds(6)).unwrap();
    assert!(rec.is_recording());
    rec.on_frame(&processed(6, 4, false), t0() + TimeDelta::seconds(12)).unwrap();
    assert!(!rec.is_recording());
    assert_eq!(rec.completed(), &[path]);

    let recording = &factory.recordings()[0];
    let pts: Vec<i64> = recording.stream_packets(0).iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 5000]);
    assert!(recording.trailer_written);
}

#[test]
fn test_odd_frames_are_cropped() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = recorder(RecordingMode::Always, dir.path());
    rec.on_frame(&processed(7, 5, false), t0()).unwrap();
    rec.stop().unwrap();

    let recording = &factory.recordings()[0];
    let (spec, _) = &recording.streams[0];
    assert_eq!((spec.width, spec.height), (6, 4));
    assert_eq!(recording.packets.len(), 1);
}

#[test]
fn test_off_mode_never_records() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = recorder(RecordingMode::Off, dir.path());
    rec.on_frame(&processed(4, 4, true), t0()).unwrap();
    assert!(!rec.is_recording());
    assert!(factory.recordings().is_empty());
}

#[test]
fn test_trigger_starts_recording() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, _factory) = recorder(RecordingMode::OnTrigger, dir.path());
    rec.on_frame(&processed(4, 4, true), t0()).unwrap();
    assert!(!rec.is_recording());

    rec.trigger();
    rec.on_frame(&processed(4, 4, false), t0() + TimeDelta::seconds(1)).unwrap();
    assert!(rec.is_recording());
    let saved = rec.stop().unwrap();
    assert!(saved.is_some());
    assert_eq!(rec.completed().to_vec(), saved.into_iter().collect::<Vec<_>>());
}

#[test]
fn test_split_at_max_duration() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let writer = MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference: HwPreference::Software,
            ..WriterOptions::default()
        },
    );
    let mut camera = CameraSettings::new("yard", "test://");
    camera.recording.mode = RecordingMode::Always;
    camera.recording.max_record_secs = 2;
    let mut rec = RecordingController::new(&camera, dir.path(), writer);

    for s in 0..5 {
        rec.on_frame(&processed(4, 4, false), t0() + TimeDelta::seconds(s)).unwrap();
    }
    assert!(rec.is_recording());
    assert_eq!(rec.completed().len(), 2);
    rec.stop().unwrap();

    let completed = rec.completed().to_vec();
    assert_eq!(completed.len(), 3);
    let mut unique = completed.clone();
    unique.dedup();
    assert_eq!(unique.len(), 3);
    assert_eq!(factory.recordings().len(), 3);
}

#[test]
fn test_audio_ignored_while_idle() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = recorder(RecordingMode::OnMotion, dir.path());
    assert!(rec.on_audio(&[0u8; 64], t0()).is_ok());
    assert!(factory.recordings().is_empty());
}

fn audio_recorder(
    audio_source: &str,
    dir: &std::path::Path,
) -> (RecordingController, MemoryCodecFactory) {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let writer = MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference: HwPreference::Software,
            timeout: Duration::from_millis(100),
            ..WriterOptions::default()
        },
    );
    let mut camera = CameraSettings::new("yard", "test://");
    camera.recording.mode = RecordingMode::Always;
    camera.recording.max_record_secs = 0;
    camera.recording.audio_codec = Some(AudioCodec::Aac);
    camera.audio.source = audio_source.to_string();
    (RecordingController::new(&camera, dir, writer), factory)
}

#[test]
fn test_audio_codec_without_audio_source_records_video_only() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = audio_recorder("", dir.path());
    for s in 0..3 {
        rec.on_frame(&processed(4, 4, false), t0() + TimeDelta::seconds(s)).unwrap();
    }
    rec.stop().unwrap();

    let recording = &factory.recordings()[0];
    assert_eq!(recording.streams.len(), 1);
    assert_eq!(recording.stream_packets(0).len(), 3);
    assert!(recording.trailer_written);
}

#[test]
fn test_silent_audio_source_keeps_recording_alive() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = audio_recorder("rtsp://yard/mic", dir.path());

    // No audio chunk ever arrives; frames keep coming past the watchdog timeout
    for i in 0..8 {
        std::thread::sleep(Duration::from_millis(25));
        rec.on_frame(&processed(4, 4, false), t0() + TimeDelta::milliseconds(i * 100))
            .unwrap();
        assert!(rec.is_recording());
    }
    rec.stop().unwrap();

    let recording = &factory.recordings()[0];
    assert_eq!(recording.streams.len(), 2);
    assert_eq!(recording.stream_packets(0).len(), 8);
    assert!(recording.trailer_written);
}

#[test]
fn test_failed_recording_is_abandoned() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, factory) = recorder(RecordingMode::Always, dir.path());
    rec.on_frame(&processed(4, 4, false), t0()).unwrap();
    let path = rec.current_path().unwrap().to_path_buf();

    rec.writer().abort_handle().store(true, Ordering::SeqCst);
    let err = rec
        .on_frame(&processed(4, 4, false), t0() + TimeDelta::seconds(1))
        .unwrap_err();
    assert_eq!(err, MediaError::Aborted);
    assert!(!rec.is_recording());
    assert!(!rec.writer().is_open());
    assert_eq!(rec.completed(), &[path]);
    assert!(!factory.recordings()[0].trailer_written);

    // The next frame starts a fresh recording
    rec.on_frame(&processed(4, 4, false), t0() + TimeDelta::seconds(2)).unwrap();
    assert!(rec.is_recording());
}
