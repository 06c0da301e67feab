// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources
//!
//! A [`FrameSource`] pushes decoded frames into a sink callback from its own
//! thread. [`GstFrameSource`] decodes any file or network URI GStreamer
//! understands.

use super::frame_loop::{FrameLoopController, LoopAction};
use super::types::{BackendError, BackendResult, Frame, FrameData, PixelFormat};
use crate::backends::audio::locator_to_uri;
use crate::constants::timing::SAMPLE_PULL_TIMEOUT;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Notifications pushed by a running source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Frame(Frame),
    /// The stream reached its end
    PlayingFinished,
    /// The stream failed after it started
    Error(String),
}

/// Receiver of source notifications, called on the source thread
pub type FrameSink = Arc<dyn Fn(SourceEvent) + Send + Sync>;

/// Capture lifecycle of a camera
pub trait FrameSource: Send {
    fn start(&mut self) -> BackendResult<()>;

    fn stop(&mut self);

    fn restart(&mut self) -> BackendResult<()> {
        self.stop();
        self.start()
    }

    fn is_running(&self) -> bool;
}

/// Pipeline owned by the capture thread
struct CaptureState {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    sink: FrameSink,
}

impl Drop for CaptureState {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Decodes a URI or path to RGB frames
pub struct GstFrameSource {
    name: String,
    locator: String,
    /// Deliver frames at the stream's native rate instead of as fast as possible
    realtime: bool,
    sink: FrameSink,
    controller: Option<FrameLoopController>,
}

impl GstFrameSource {
    pub fn new(name: &str, locator: &str, sink: FrameSink) -> Self {
        Self {
            name: name.to_string(),
            locator: locator.to_string(),
            realtime: true,
            sink,
            controller: None,
        }
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// `gst-launch` description of the decode pipeline
    pub fn launch_description(uri: &str, realtime: bool) -> String {
        format!(
            "uridecodebin uri=\"{}\" ! queue ! videoconvert ! video/x-raw,format={} ! \
             appsink name=sink sync={} max-buffers=2 drop=false",
            uri,
            PixelFormat::Rgb24.gst_format(),
            realtime
        )
    }

    fn build_pipeline(&self) -> BackendResult<CaptureState> {
        gst::init()
            .map_err(|e| BackendError::InitializationFailed(format!("GStreamer init failed: {}", e)))?;

        let uri = locator_to_uri(&self.locator)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        let description = Self::launch_description(&uri, self.realtime);
        debug!(camera = %self.name, pipeline = %description, "Creating frame pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| {
                BackendError::InitializationFailed(format!("Failed to create pipeline: {}", e))
            })?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to find appsink".into()))?
            .downcast::<AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to downcast to AppSink".into()))?;

        let state = CaptureState {
            pipeline,
            appsink,
            sink: Arc::clone(&self.sink),
        };
        state.pipeline.set_state(gst::State::Playing).map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to start pipeline: {:?}", e))
        })?;
        Ok(state)
    }
}

impl FrameSource for GstFrameSource {
    fn start(&mut self) -> BackendResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let state = self.build_pipeline()?;
        info!(camera = %self.name, locator = %self.locator, "Frame source started");

        let name = self.name.clone();
        self.controller = Some(FrameLoopController::start_with_init(
            &format!("source-{}", self.name),
            move || Ok(state),
            move |state: &mut CaptureState| capture_step(&name, state),
        ));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!(camera = %self.name, "Frame source stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.controller.as_ref().is_some_and(|c| c.is_running())
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pull at most one frame; stop on end of stream or pipeline error
fn capture_step(name: &str, state: &mut CaptureState) -> LoopAction {
    if let Some(message) = pipeline_error(&state.pipeline) {
        (state.sink)(SourceEvent::Error(message));
        return LoopAction::Stop;
    }

    match state
        .appsink
        .try_pull_sample(gst::ClockTime::from_mseconds(SAMPLE_PULL_TIMEOUT.as_millis() as u64))
    {
        Some(sample) => {
            match sample_to_frame(&sample) {
                Ok(frame) => (state.sink)(SourceEvent::Frame(frame)),
                Err(e) => warn!(camera = %name, error = %e, "Dropping undecodable sample"),
            }
            LoopAction::Continue
        }
        None if state.appsink.is_eos() => {
            info!(camera = %name, "End of stream");
            (state.sink)(SourceEvent::PlayingFinished);
            LoopAction::Stop
        }
        None => LoopAction::Continue,
    }
}

fn pipeline_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Warning]) {
        match msg.view() {
            gst::MessageView::Error(err) => {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "Frame pipeline error"
                );
                return Some(err.error().to_string());
            }
            gst::MessageView::Warning(w) => {
                warn!(warning = %w.error(), debug = ?w.debug(), "Frame pipeline warning");
            }
            _ => {}
        }
    }
    None
}

/// Wrap a decoded sample without copying its pixels
fn sample_to_frame(sample: &gst::Sample) -> BackendResult<Frame> {
    let caps = sample
        .caps()
        .ok_or_else(|| BackendError::Other("No caps on sample".into()))?;
    let info = VideoInfo::from_caps(caps)
        .map_err(|e| BackendError::FormatNotSupported(format!("Invalid video caps: {}", e)))?;
    let format = PixelFormat::from_gst_format(&info.format().to_string()).ok_or_else(|| {
        BackendError::FormatNotSupported(format!("Unexpected format {}", info.format()))
    })?;
    let stride = info.stride().first().copied().unwrap_or(0).max(0) as u32;

    let buffer = sample
        .buffer_owned()
        .ok_or_else(|| BackendError::Other("No buffer in sample".into()))?;
    let mapped = buffer
        .into_mapped_buffer_readable()
        .map_err(|_| BackendError::Other("Failed to map buffer".into()))?;

    let frame = Frame {
        width: info.width(),
        height: info.height(),
        format,
        stride,
        data: FrameData::from_mapped_buffer(mapped),
        captured_at: Instant::now(),
    };
    frame.validate()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_description_requests_rgb() {
        let desc = GstFrameSource::launch_description("file:///tmp/a.mp4", false);
        assert!(desc.starts_with("uridecodebin uri=\"file:///tmp/a.mp4\""));
        assert!(desc.contains("format=RGB"));
        assert!(desc.contains("sync=false"));
    }

    #[test]
    fn test_new_source_is_stopped() {
        let sink: FrameSink = Arc::new(|_| {});
        let mut source = GstFrameSource::new("cam", "/nonexistent.mp4", sink);
        assert!(!source.is_running());
        source.stop();
        assert!(!source.is_running());
    }
}
