// SPDX-License-Identifier: GPL-3.0-only

//! Recording controller
//!
//! Decides from the pipeline output when a camera records and feeds frames
//! and audio chunks to its [`MediaWriter`].

use super::frame::{PipelineHandle, ProcessedFrame};
use crate::backends::camera::{Frame, FrameData, PixelFormat};
use crate::config::{CameraSettings, RecordingMode, RecordingSettings};
use crate::constants::recording::FILE_TIMESTAMP_FORMAT;
use crate::errors::MediaResult;
use crate::media::writer::{MediaWriter, OpenParams};
use chrono::{DateTime, Local, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};

/// `<camera>_<YYYY-MM-DD_HH-MM-SS>.<ext>` with unsafe characters replaced
pub fn recording_file_name(camera: &str, at: DateTime<Local>, extension: &str) -> String {
    let camera: String = camera
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.{}", camera, at.format(FILE_TIMESTAMP_FORMAT), extension)
}

/// Largest even dimensions that fit in `width`×`height`
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width & !1, height & !1)
}

#[derive(Debug, Clone)]
struct ActiveRecording {
    path: PathBuf,
    width: u32,
    height: u32,
    started: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

pub struct RecordingController {
    camera: String,
    settings: RecordingSettings,
    output_dir: PathBuf,
    writer: MediaWriter,
    /// An audio track is only opened when the camera has an audio source
    has_audio_source: bool,
    pipeline: Option<PipelineHandle>,
    trigger: Arc<AtomicBool>,
    active: Option<ActiveRecording>,
    completed: Vec<PathBuf>,
}

impl RecordingController {
    pub fn new(camera: &CameraSettings, output_dir: &Path, writer: MediaWriter) -> Self {
        Self {
            camera: camera.name.clone(),
            settings: camera.recording.clone(),
            output_dir: output_dir.to_path_buf(),
            writer,
            has_audio_source: !camera.audio.source.trim().is_empty(),
            pipeline: None,
            trigger: Arc::new(AtomicBool::new(false)),
            active: None,
            completed: Vec::new(),
        }
    }

    /// Mirror the recording state into the pipeline overlay
    pub fn with_pipeline_handle(mut self, handle: PipelineHandle) -> Self {
        self.pipeline = Some(handle);
        self
    }

    /// Start (or extend) a recording in `on_trigger` mode
    pub fn trigger(&self) {
        self.trigger.store(true, Ordering::SeqCst);
    }

    /// Flag that [`Self::trigger`] sets, for use from other threads
    pub fn trigger_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.trigger)
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Files finished so far
    pub fn completed(&self) -> &[PathBuf] {
        &self.completed
    }

    pub fn writer(&self) -> &MediaWriter {
        &self.writer
    }

    /// Feed one processed frame captured at `at`
    pub fn on_frame(&mut self, frame: &ProcessedFrame, at: DateTime<Utc>) -> MediaResult<()> {
        let activity = match self.settings.mode {
            RecordingMode::Off => false,
            RecordingMode::Always => true,
            RecordingMode::OnMotion => frame.motion,
            RecordingMode::OnTrigger => self.trigger.swap(false, Ordering::SeqCst),
        };
        if let Some(active) = self.active.as_mut()
            && activity
        {
            active.last_activity = at;
        }

        if let Some(active) = self.active.as_ref() {
            let post_motion = TimeDelta::seconds(self.settings.post_motion_secs as i64);
            let idle = self.settings.mode != RecordingMode::Always
                && at - active.last_activity > post_motion;
            let max = self.settings.max_record_secs;
            let expired = max > 0 && at - active.started >= TimeDelta::seconds(max as i64);
            if idle || self.settings.mode == RecordingMode::Off {
                self.stop()?;
            } else if expired {
                info!(camera = %self.camera, "Splitting recording");
                let last_activity = active.last_activity;
                self.stop()?;
                self.start(frame, at)?;
                if let Some(active) = self.active.as_mut() {
                    active.last_activity = last_activity;
                }
            }
        }

        if self.active.is_none() && activity {
            self.start(frame, at)?;
        }

        let Some(active) = self.active.as_ref() else {
            return Ok(());
        };
        let cropped = crop_frame(frame, active.width, active.height);
        if let Err(e) = self.writer.write_frame(&cropped, Some(at)) {
            error!(camera = %self.camera, error = %e, "Recording failed");
            self.abandon();
            return Err(e);
        }
        Ok(())
    }

    /// Feed one PCM chunk; ignored while not recording
    pub fn on_audio(&mut self, pcm: &[u8], at: DateTime<Utc>) -> MediaResult<()> {
        if self.active.is_none() {
            return Ok(());
        }
        if let Err(e) = self.writer.write_audio(pcm, at) {
            error!(camera = %self.camera, error = %e, "Recording failed while writing audio");
            self.abandon();
            return Err(e);
        }
        Ok(())
    }

    fn start(&mut self, frame: &ProcessedFrame, at: DateTime<Utc>) -> MediaResult<()> {
        let (w, h) = frame.image.dimensions();
        let (width, height) = even_dimensions(w, h);
        let extension = self.settings.container_format().extension();
        let path = self.unique_path(at, extension);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.writer.open(OpenParams {
            path: path.clone(),
            width,
            height,
            video_codec: self.settings.video_codec,
            frame_rate: self.settings.frame_rate,
            audio_codec: self.settings.audio_codec.filter(|_| self.has_audio_source),
            created: at,
            quality: self.settings.quality,
        })?;

        info!(camera = %self.camera, path = %path.display(), width, height, "Recording started");
        self.active = Some(ActiveRecording {
            path,
            width,
            height,
            started: at,
            last_activity: at,
        });
        self.set_overlay_state(true);
        Ok(())
    }

    fn unique_path(&self, at: DateTime<Utc>, extension: &str) -> PathBuf {
        let name = recording_file_name(&self.camera, at.with_timezone(&Local), extension);
        let mut path = self.output_dir.join(&name);
        let mut n = 1;
        while path.exists() || self.completed.contains(&path) {
            let stem = name.trim_end_matches(&format!(".{}", extension));
            path = self.output_dir.join(format!("{}_{}.{}", stem, n, extension));
            n += 1;
        }
        path
    }

    /// Finish the current recording, returning its path
    pub fn stop(&mut self) -> MediaResult<Option<PathBuf>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        self.set_overlay_state(false);
        self.writer.close()?;
        info!(
            camera = %self.camera,
            path = %active.path.display(),
            size = self.writer.size_bytes(),
            "Recording finished"
        );
        self.completed.push(active.path.clone());
        Ok(Some(active.path))
    }

    /// Drop a failed recording; its file is kept as far as it got
    fn abandon(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = self.writer.close() {
                warn!(camera = %self.camera, error = %e, "Failed to close abandoned recording");
            }
            self.completed.push(active.path);
        }
        self.set_overlay_state(false);
    }

    fn set_overlay_state(&self, recording: bool) {
        if let Some(handle) = self.pipeline.as_ref() {
            handle.set_recording(recording);
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(camera = %self.camera, error = %e, "Failed to finish recording");
        }
    }
}

/// View the top-left `width`×`height` of a processed frame
fn crop_frame(frame: &ProcessedFrame, width: u32, height: u32) -> Frame {
    let (w, _) = frame.image.dimensions();
    Frame {
        width: width.min(w),
        height: height.min(frame.image.height()),
        format: PixelFormat::Rgb24,
        stride: w * 3,
        data: FrameData::from(frame.image.as_raw().clone()),
        captured_at: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::RgbImage;

    #[test]
    fn test_file_name() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            recording_file_name("Front door", at, "mkv"),
            "Front_door_2024-01-02_03-04-05.mkv"
        );
    }

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even_dimensions(641, 481), (640, 480));
        assert_eq!(even_dimensions(640, 480), (640, 480));
    }

    #[test]
    fn test_crop_keeps_stride() {
        let processed = ProcessedFrame {
            image: Arc::new(RgbImage::new(5, 3)),
            motion: false,
            level: 0.0,
        };
        let frame = crop_frame(&processed, 4, 2);
        assert_eq!((frame.width, frame.height, frame.stride), (4, 2, 15));
        assert!(frame.validate().is_ok());
    }
}
