// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the media writer on the in-memory backend

use camwatch::errors::MediaError;
use camwatch::media::writer::{MemoryCodecFactory, MemoryOptions};
use camwatch::media::{
    AudioCodec, ContainerFormat, HwPreference, HwVendor, MediaWriter, OpenParams, VideoCodec,
    WriterOptions,
};
use camwatch::Frame;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn params(width: u32, height: u32) -> OpenParams {
    OpenParams {
        path: "/recordings/test.mkv".into(),
        width,
        height,
        video_codec: Some(VideoCodec::H264),
        frame_rate: 10,
        audio_codec: None,
        created: created(),
        quality: 23,
    }
}

fn writer(factory: &MemoryCodecFactory, hw_preference: HwPreference) -> MediaWriter {
    MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference,
            ..WriterOptions::default()
        },
    )
}

fn frame(width: u32, height: u32) -> Frame {
    Frame::from_rgb(RgbImage::from_pixel(width, height, Rgb([200, 40, 90])))
}

/// One encoder frame of S16LE mono PCM
fn pcm(codec: AudioCodec) -> Vec<u8> {
    vec![0u8; codec.frame_size() * 2]
}

#[test]
fn test_odd_dimensions_rejected() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    let err = writer.open(params(641, 480)).unwrap_err();
    assert_eq!(err, MediaError::InvalidDimensions { width: 641, height: 480 });
    assert!(!writer.is_open());
    assert!(factory.recordings().is_empty());
}

#[test]
fn test_constant_frame_rate_timestamps() {
    let factory = MemoryCodecFactory::new(MemoryOptions {
        video_latency: 2,
        ..MemoryOptions::default()
    });
    let mut writer = writer(&factory, HwPreference::Software);
    writer.open(params(8, 6)).unwrap();
    for _ in 0..5 {
        writer.write_frame(&frame(8, 6), None).unwrap();
    }
    writer.close().unwrap();

    let recording = &factory.recordings()[0];
    assert_eq!(recording.format, ContainerFormat::Matroska);
    assert!(recording.header_written);
    assert!(recording.trailer_written);
    let pts: Vec<i64> = recording.stream_packets(0).iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 1, 2, 3, 4]);
    assert_eq!(writer.size_bytes(), recording.size_bytes());
}

#[test]
fn test_variable_frame_rate_timestamps_increase() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer
        .open(OpenParams {
            frame_rate: 0,
            ..params(4, 4)
        })
        .unwrap();

    let at = created() + TimeDelta::milliseconds(40);
    writer.write_frame(&frame(4, 4), Some(created())).unwrap();
    writer.write_frame(&frame(4, 4), Some(at)).unwrap();
    writer.write_frame(&frame(4, 4), Some(at)).unwrap();
    writer.close().unwrap();

    let recording = &factory.recordings()[0];
    let pts: Vec<i64> = recording.stream_packets(0).iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 40, 41]);
}

#[test]
fn test_frame_size_mismatch_keeps_session() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer.open(params(4, 4)).unwrap();

    let err = writer.write_frame(&frame(6, 4), None).unwrap_err();
    assert!(matches!(err, MediaError::FrameSizeMismatch { .. }));
    writer.write_frame(&frame(4, 4), None).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_closed_writer() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    assert_eq!(writer.write_frame(&frame(4, 4), None), Err(MediaError::NotOpen));
    assert_eq!(writer.write_audio(&[0, 0], created()), Err(MediaError::NotOpen));
    assert!(writer.close().is_ok());

    writer.open(params(4, 4)).unwrap();
    assert_eq!(writer.open(params(4, 4)), Err(MediaError::AlreadyOpen));
    writer.close().unwrap();
    assert!(writer.close().is_ok());
    assert!(!writer.is_open());
}

#[test]
fn test_writer_is_reusable() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    for name in ["a.mkv", "b.mp4"] {
        writer
            .open(OpenParams {
                path: name.into(),
                ..params(4, 4)
            })
            .unwrap();
        writer.write_frame(&frame(4, 4), None).unwrap();
        writer.close().unwrap();
    }
    let recordings = factory.recordings();
    assert_eq!(recordings.len(), 2);
    assert_eq!(recordings[1].format, ContainerFormat::Mp4);
}

#[test]
fn test_hardware_fallback_to_software() {
    let factory = MemoryCodecFactory::new(MemoryOptions {
        unavailable: ["nvh264enc".to_string()].into_iter().collect(),
        ..MemoryOptions::default()
    });
    let mut writer = writer(&factory, HwPreference::Vendor(HwVendor::Nvidia));
    writer.open(params(4, 4)).unwrap();
    writer.close().unwrap();
    assert_eq!(factory.opened_encoders(), vec!["x264enc".to_string()]);
}

#[test]
fn test_hardware_preferred_when_available() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Vendor(HwVendor::Nvidia));
    writer.open(params(4, 4)).unwrap();
    writer.close().unwrap();
    assert_eq!(factory.opened_encoders(), vec!["nvh264enc".to_string()]);
}

#[test]
fn test_no_encoder_available() {
    let factory = MemoryCodecFactory::new(MemoryOptions {
        unavailable: ["x264enc", "openh264enc"].iter().map(|s| s.to_string()).collect(),
        ..MemoryOptions::default()
    });
    let mut writer = writer(&factory, HwPreference::Software);
    assert!(matches!(writer.open(params(4, 4)), Err(MediaError::NoEncoder(_))));
    assert!(!writer.is_open());
}

#[test]
fn test_audio_timestamps_strictly_increase() {
    let codec = AudioCodec::Aac;
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer
        .open(OpenParams {
            audio_codec: Some(codec),
            ..params(4, 4)
        })
        .unwrap();

    // Capture times run backwards
    for ms in [300, 200, 100, 100] {
        writer
            .write_audio(&pcm(codec), created() + TimeDelta::milliseconds(ms))
            .unwrap();
    }
    writer.write_frame(&frame(4, 4), None).unwrap();
    writer.close().unwrap();

    let recording = &factory.recordings()[0];
    let audio: Vec<i64> = recording.stream_packets(1).iter().map(|p| p.pts).collect();
    assert_eq!(audio.len(), 4);
    assert!(audio.windows(2).all(|w| w[1] > w[0]), "{:?}", audio);
}

#[test]
fn test_partial_audio_chunks_are_buffered() {
    let codec = AudioCodec::Opus;
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer
        .open(OpenParams {
            audio_codec: Some(codec),
            ..params(4, 4)
        })
        .unwrap();

    let half = codec.frame_size();
    writer.write_audio(&vec![0u8; half], created()).unwrap();
    writer.write_audio(&vec![0u8; half], created()).unwrap();
    writer.close().unwrap();

    assert_eq!(factory.recordings()[0].stream_packets(1).len(), 1);
}

#[test]
fn test_audio_failure_keeps_video() {
    let codec = AudioCodec::Aac;
    let factory = MemoryCodecFactory::new(MemoryOptions {
        fail_audio_after: Some(1),
        ..MemoryOptions::default()
    });
    let mut writer = writer(&factory, HwPreference::Software);
    writer
        .open(OpenParams {
            audio_codec: Some(codec),
            ..params(4, 4)
        })
        .unwrap();

    for i in 0..3 {
        writer.write_frame(&frame(4, 4), None).unwrap();
        assert!(writer.write_audio(&pcm(codec), created() + TimeDelta::milliseconds(i * 100)).is_ok());
    }
    writer.close().unwrap();

    let recording = &factory.recordings()[0];
    assert_eq!(recording.stream_packets(0).len(), 3);
    assert_eq!(recording.stream_packets(1).len(), 1);
}

#[test]
fn test_audio_without_audio_track_is_ignored() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer.open(params(4, 4)).unwrap();
    assert!(writer.write_audio(&pcm(AudioCodec::Aac), created()).is_ok());
    writer.close().unwrap();
    assert_eq!(factory.recordings()[0].streams.len(), 1);
}

#[test]
fn test_stalled_header_times_out() {
    let factory = MemoryCodecFactory::new(MemoryOptions {
        stall_header: true,
        ..MemoryOptions::default()
    });
    let mut writer = MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference: HwPreference::Software,
            timeout: Duration::from_millis(50),
            ..WriterOptions::default()
        },
    );
    assert_eq!(writer.open(params(4, 4)), Err(MediaError::TimedOut));
    assert!(!writer.is_open());
    assert!(!factory.recordings()[0].header_written);
}

#[test]
fn test_abort_fails_session_until_close() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer.open(params(4, 4)).unwrap();
    writer.write_frame(&frame(4, 4), None).unwrap();

    writer.abort_handle().store(true, Ordering::SeqCst);
    assert_eq!(writer.write_frame(&frame(4, 4), None), Err(MediaError::Aborted));
    assert_eq!(writer.write_frame(&frame(4, 4), None), Err(MediaError::SessionFailed));
    assert!(writer.close().is_ok());
    assert!(!factory.recordings()[0].trailer_written);

    // Closing clears the abort flag
    writer.open(params(4, 4)).unwrap();
    writer.write_frame(&frame(4, 4), None).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_idle_audio_track_does_not_stall_video() {
    let codec = AudioCodec::Aac;
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = MediaWriter::new(
        Arc::new(factory.clone()),
        WriterOptions {
            hw_preference: HwPreference::Software,
            timeout: Duration::from_millis(100),
            ..WriterOptions::default()
        },
    );
    writer
        .open(OpenParams {
            audio_codec: Some(codec),
            ..params(4, 4)
        })
        .unwrap();

    // Video keeps flowing for longer than the timeout while no audio arrives
    for _ in 0..8 {
        std::thread::sleep(Duration::from_millis(25));
        writer.write_frame(&frame(4, 4), None).unwrap();
    }
    writer.close().unwrap();

    let recording = &factory.recordings()[0];
    assert!(recording.trailer_written);
    assert_eq!(recording.stream_packets(0).len(), 8);
    assert!(recording.stream_packets(1).is_empty());
}

#[test]
fn test_abort_without_session_is_cleared_by_close() {
    let factory = MemoryCodecFactory::new(MemoryOptions::default());
    let mut writer = writer(&factory, HwPreference::Software);
    writer.abort_handle().store(true, Ordering::SeqCst);
    assert_eq!(writer.open(params(4, 4)), Err(MediaError::Aborted));

    assert!(writer.close().is_ok());
    assert!(!writer.abort_handle().load(Ordering::SeqCst));
    writer.open(params(4, 4)).unwrap();
    writer.write_frame(&frame(4, 4), None).unwrap();
    writer.close().unwrap();
}
