// SPDX-License-Identifier: GPL-3.0-only

//! One running camera
//!
//! Wires a frame source through the frame pipeline into the recording
//! controller, plus an optional audio reader thread feeding the same
//! controller. Frames are processed synchronously on the source's capture
//! thread; the controller's mutex serializes frame and audio writes.

use super::frame::{FrameEvent, FramePipeline, FrameRegistry, PipelineHandle};
use super::recording::RecordingController;
use crate::backends::audio::{AudioReader, StopReason, parse_filter_list};
use crate::backends::camera::{BackendResult, FrameSink, FrameSource, GstFrameSource, SourceEvent};
use crate::config::CameraSettings;
use crate::media::writer::{CodecFactory, MediaWriter, WriterOptions};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CameraRunner {
    id: String,
    source: Box<dyn FrameSource>,
    handle: PipelineHandle,
    recorder: Arc<Mutex<RecordingController>>,
    audio_stop: Arc<AtomicBool>,
    audio_thread: Option<JoinHandle<()>>,
}

impl CameraRunner {
    /// Build the camera's pipeline and recorder and start capturing
    pub fn start(
        settings: CameraSettings,
        output_dir: &Path,
        masks_dir: Option<&Path>,
        registry: FrameRegistry,
        factory: Arc<dyn CodecFactory>,
    ) -> BackendResult<(Self, UnboundedReceiver<FrameEvent>)> {
        let (mut pipeline, events) = FramePipeline::new(settings.clone());
        pipeline = pipeline.with_registry(registry);
        if let Some(dir) = masks_dir {
            pipeline = pipeline.with_masks_dir(dir.to_path_buf());
        }
        let handle = pipeline.handle();

        let writer = MediaWriter::new(
            factory,
            WriterOptions {
                hw_preference: settings.encoder.preference(),
                gpu_index: settings.encoder.gpu_index,
                timeout: settings.encoder.watchdog_timeout(),
            },
        );
        let recorder = Arc::new(Mutex::new(
            RecordingController::new(&settings, output_dir, writer).with_pipeline_handle(handle.clone()),
        ));

        let pipeline = Arc::new(Mutex::new(pipeline));
        let sink = frame_sink(Arc::clone(&pipeline), Arc::clone(&recorder));
        let mut source: Box<dyn FrameSource> =
            Box::new(GstFrameSource::new(&settings.id, &settings.source, sink));
        source.start()?;

        let audio_stop = Arc::new(AtomicBool::new(false));
        let audio_thread = spawn_audio(&settings, Arc::clone(&recorder), Arc::clone(&audio_stop));

        info!(camera = %settings.id, "Camera started");
        Ok((
            Self {
                id: settings.id,
                source,
                handle,
                recorder,
                audio_stop,
                audio_thread,
            },
            events,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pipeline(&self) -> &PipelineHandle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.recorder).is_recording()
    }

    /// Start a recording in `on_trigger` mode and run a `trigger` hook
    pub fn trigger(&self) {
        lock(&self.recorder).trigger();
        self.handle.trigger_hook();
    }

    /// Stop capture and audio, finishing any open recording
    pub fn stop(&mut self) {
        self.source.stop();
        self.audio_stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.audio_thread.take()
            && thread.join().is_err()
        {
            warn!(camera = %self.id, "Audio thread panicked");
        }
        match lock(&self.recorder).stop() {
            Ok(Some(path)) => info!(camera = %self.id, path = %path.display(), "Recording saved"),
            Ok(None) => {}
            Err(e) => error!(camera = %self.id, error = %e, "Failed to finish recording"),
        }
    }

    /// Recordings finished so far
    pub fn recordings(&self) -> Vec<std::path::PathBuf> {
        lock(&self.recorder).completed().to_vec()
    }
}

impl Drop for CameraRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_sink(
    pipeline: Arc<Mutex<FramePipeline>>,
    recorder: Arc<Mutex<RecordingController>>,
) -> FrameSink {
    Arc::new(move |event| match event {
        SourceEvent::Frame(frame) => {
            let Some(processed) = lock(&pipeline).on_frame(frame) else {
                return;
            };
            let result = lock(&recorder).on_frame(&processed, Utc::now());
            if let Err(e) = result {
                lock(&pipeline).on_source_error(format!("Recording failed: {}", e));
            }
        }
        SourceEvent::PlayingFinished => lock(&pipeline).on_playing_finished(),
        SourceEvent::Error(message) => lock(&pipeline).on_source_error(message),
    })
}

fn spawn_audio(
    settings: &CameraSettings,
    recorder: Arc<Mutex<RecordingController>>,
    stop: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    let locator = settings.audio.source.trim().to_string();
    if locator.is_empty() || settings.recording.audio_codec.is_none() {
        return None;
    }

    let mut reader = AudioReader::new();
    reader.set_timeout(settings.encoder.watchdog_timeout());
    for filter in parse_filter_list(&settings.audio.filters) {
        reader.add_filter(&filter.name, &filter.args, &filter.key);
    }
    let camera = settings.id.clone();

    Some(std::thread::spawn(move || {
        let result = reader.read_samples(&locator, |chunk| {
            if let Err(e) = lock(&recorder).on_audio(chunk, Utc::now()) {
                warn!(camera = %camera, error = %e, "Audio chunk rejected");
            }
            stop.load(Ordering::SeqCst)
        });
        match result {
            Ok(summary) if matches!(summary.reason, StopReason::Error(_)) => {
                warn!(camera = %camera, reason = ?summary.reason, chunks = summary.chunks, "Audio stopped")
            }
            Ok(summary) => {
                info!(camera = %camera, chunks = summary.chunks, "Audio finished")
            }
            Err(e) => error!(camera = %camera, error = %e, "Audio source failed"),
        }
    }))
}
