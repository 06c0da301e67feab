// SPDX-License-Identifier: GPL-3.0-only

//! Per-camera frame transform pipeline
//!
//! Every delivered frame runs through a fixed chain on the camera's capture
//! thread:
//!
//! ```text
//! rotate ─► mask ─► hook ─► motion ─► fisheye ─► zoom ─► PiP ─► overlay
//! ```
//!
//! Each step can be a no-op. A failing or panicking step drops that one
//! frame, puts the camera in error state and the next frame starts clean. A
//! hook failure only skips the hook. Notifications leave through an unbounded
//! channel so a slow consumer never stalls capture.

pub mod fisheye;
pub mod hook;
pub mod mask;
pub mod overlay;
pub mod pip;
pub mod stats;
pub mod zoom;

pub use fisheye::{FisheyeCorrector, FisheyeSettings};
pub use hook::{FrameHook, HookMode, RECENT_MOTION_WINDOW};
pub use mask::FrameMask;
pub use overlay::{Anchor, OverlayContext, OverlaySettings, TextOverlay};
pub use pip::{FrameRegistry, PipEntry};
pub use stats::FpsCounter;

use crate::backends::camera::{Frame, PixelFormat, RotateFlip};
use crate::config::CameraSettings;
use crate::constants::motion::LEVEL_CEILING;
use crate::errors::{PipelineError, PipelineResult};
use crate::motion::MotionEngine;
use image::RgbImage;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

/// Notifications emitted by a pipeline
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A processed frame is available
    Frame(Arc<RgbImage>),
    /// Motion was declared on the last frame
    Detect { level: f64 },
    /// Alert text from the frame hook
    Alert(String),
    /// A frame or hook failed
    Error(String),
    /// The source reached the end of its stream
    PlayingFinished,
}

/// Output of one processed frame
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub image: Arc<RgbImage>,
    pub motion: bool,
    pub level: f64,
}

/// State readable and settable from other threads
#[derive(Debug, Default)]
struct Shared {
    motion_detected: AtomicBool,
    motion_latch: AtomicBool,
    hook_trigger: AtomicBool,
    resources_dirty: AtomicBool,
    recording: AtomicBool,
    /// Bits of the last motion level
    level_bits: AtomicU64,
    error: Mutex<Option<String>>,
}

/// Cross-thread control of a running pipeline
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    /// Run the hook on the next frame in `trigger` mode
    pub fn trigger_hook(&self) {
        self.shared.hook_trigger.store(true, Ordering::SeqCst);
    }

    /// Reload mask, font, colors and rotation on the next frame
    pub fn update_resources(&self) {
        self.shared.resources_dirty.store(true, Ordering::SeqCst);
    }

    /// Whether motion is active or was declared since the last call
    pub fn motion_recently_detected(&self) -> bool {
        let latched = self.shared.motion_latch.swap(false, Ordering::SeqCst);
        self.shared.motion_detected.load(Ordering::SeqCst) || latched
    }

    pub fn motion_detected(&self) -> bool {
        self.shared.motion_detected.load(Ordering::SeqCst)
    }

    pub fn motion_level(&self) -> f64 {
        f64::from_bits(self.shared.level_bits.load(Ordering::SeqCst))
    }

    /// Shown as `{REC}` in the overlay
    pub fn set_recording(&self, recording: bool) {
        self.shared.recording.store(recording, Ordering::SeqCst);
    }

    /// Message of the last failed frame, cleared by the next good frame
    pub fn error(&self) -> Option<String> {
        self.shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Resources rebuilt by `update_resources`
struct Resources {
    rotate: RotateFlip,
    mask: FrameMask,
    overlay: TextOverlay,
    pip: Vec<PipEntry>,
    tags: HashMap<String, String>,
}

impl Resources {
    fn load(settings: &CameraSettings, masks_dir: Option<&std::path::Path>) -> Self {
        Self {
            rotate: RotateFlip::from_name(&settings.rotate_mode),
            mask: FrameMask::load(&settings.mask_path, masks_dir),
            overlay: TextOverlay::new(settings.overlay.clone()),
            pip: pip::parse_pip_config(&settings.pip),
            tags: overlay::parse_tags(&settings.tags),
        }
    }
}

pub struct FramePipeline {
    settings: CameraSettings,
    masks_dir: Option<PathBuf>,
    resources: Resources,
    engine: MotionEngine,
    hook: Option<Box<dyn FrameHook>>,
    fisheye: FisheyeCorrector,
    zoom_focus: Option<(f32, f32)>,
    fps: FpsCounter,
    registry: FrameRegistry,
    events: UnboundedSender<FrameEvent>,
    shared: Arc<Shared>,
    level: f64,
    last_detection: Option<Instant>,
    last_motion: Option<Instant>,
}

impl FramePipeline {
    /// Build a pipeline and the receiving end of its events
    pub fn new(settings: CameraSettings) -> (Self, UnboundedReceiver<FrameEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::with_sender(settings, tx), rx)
    }

    pub fn with_sender(settings: CameraSettings, events: UnboundedSender<FrameEvent>) -> Self {
        let mut engine = MotionEngine::from_settings(&settings.motion);
        engine.set_zones(settings.motion_zones.clone());
        let resources = Resources::load(&settings, None);
        info!(camera = %settings.id, detector = ?settings.motion.detector, "Frame pipeline created");
        Self {
            zoom_focus: settings.zoom.focus,
            settings,
            masks_dir: None,
            resources,
            engine,
            hook: None,
            fisheye: FisheyeCorrector::new(),
            fps: FpsCounter::new(),
            registry: FrameRegistry::new(),
            events,
            shared: Arc::new(Shared::default()),
            level: 0.0,
            last_detection: None,
            last_motion: None,
        }
    }

    pub fn with_masks_dir(mut self, dir: PathBuf) -> Self {
        self.masks_dir = Some(dir);
        self.reload_resources();
        self
    }

    pub fn with_registry(mut self, registry: FrameRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn FrameHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn engine(&self) -> &MotionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut MotionEngine {
        &mut self.engine
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    pub fn motion_level(&self) -> f64 {
        self.level
    }

    /// Replace the camera settings; the motion engine restarts when its
    /// settings changed
    pub fn update_settings(&mut self, settings: CameraSettings) {
        if settings.motion != self.settings.motion {
            self.engine = MotionEngine::from_settings(&settings.motion);
            self.level = 0.0;
        }
        if settings.motion_zones != self.settings.motion_zones || settings.motion != self.settings.motion {
            self.engine.set_zones(settings.motion_zones.clone());
        }
        if settings.zoom.focus.is_some() {
            self.zoom_focus = settings.zoom.focus;
        }
        self.settings = settings;
        self.handle().update_resources();
    }

    fn reload_resources(&mut self) {
        self.resources = Resources::load(&self.settings, self.masks_dir.as_deref());
        self.fisheye.invalidate();
        debug!(camera = %self.settings.id, "Pipeline resources reloaded");
    }

    /// The source reached the end of its stream
    pub fn on_playing_finished(&self) {
        let _ = self.events.send(FrameEvent::PlayingFinished);
    }

    /// The source failed after it started
    pub fn on_source_error(&self, message: String) {
        self.set_error(Some(message.clone()));
        self.registry.set_error(&self.settings.id, true);
        let _ = self.events.send(FrameEvent::Error(message));
    }

    /// Process one raw frame
    ///
    /// Returns `None` when the frame was dropped because a step failed.
    pub fn on_frame(&mut self, frame: Frame) -> Option<ProcessedFrame> {
        let now = frame.captured_at;
        self.fps.tick(now);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(&frame, now)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload.as_ref()))));
        match result {
            Ok(processed) => {
                self.set_error(None);
                self.registry.publish(&self.settings.id, Arc::clone(&processed.image));
                let _ = self.events.send(FrameEvent::Frame(Arc::clone(&processed.image)));
                Some(processed)
            }
            Err(e) => {
                warn!(camera = %self.settings.id, error = %e, "Dropping frame");
                self.set_error(Some(e.to_string()));
                self.registry.set_error(&self.settings.id, true);
                let _ = self.events.send(FrameEvent::Error(e.to_string()));
                None
            }
        }
    }

    fn set_error(&self, error: Option<String>) {
        *self.shared.error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn process(&mut self, frame: &Frame, now: Instant) -> PipelineResult<ProcessedFrame> {
        if self.shared.resources_dirty.swap(false, Ordering::SeqCst) {
            self.reload_resources();
        }
        self.engine.set_grayscale_source(frame.format == PixelFormat::Gray8);

        let mut image = frame.to_rgb_image()?;
        image = self.resources.rotate.apply(image);
        self.resources.mask.apply(&mut image);
        image = self.run_hook(image, now);

        let motion = self.detect_motion(&mut image, now)?;

        if self.settings.fisheye.enabled {
            image = self.fisheye.apply(&image, &self.settings.fisheye);
        }
        image = self.apply_zoom(image);
        if !self.resources.pip.is_empty() {
            pip::compose(&mut image, &self.resources.pip, &self.registry, &self.settings.id);
        }
        if self.resources.overlay.is_active() {
            let ctx = OverlayContext {
                fps: self.fps.fps(),
                camera: &self.settings.name,
                recording: self.shared.recording.load(Ordering::SeqCst),
                level: self.level,
                tags: &self.resources.tags,
            };
            self.resources.overlay.draw(&mut image, &ctx);
        }

        Ok(ProcessedFrame {
            image: Arc::new(image),
            motion,
            level: self.level,
        })
    }

    fn run_hook(&mut self, image: RgbImage, now: Instant) -> RgbImage {
        let Some(hook) = self.hook.as_mut() else {
            return image;
        };
        let shared = &self.shared;
        let run = self.settings.hook_mode.should_run(now, self.last_motion, || {
            shared.hook_trigger.swap(false, Ordering::SeqCst)
        });
        if !run {
            return image;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook.process_frame(&image)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload.as_ref()))));
        let result = match outcome {
            Ok(processed) => processed,
            Err(e) => {
                warn!(camera = %self.settings.id, error = %e, "Frame hook failed");
                let _ = self.events.send(FrameEvent::Error(e.to_string()));
                image
            }
        };
        let alert = hook.alert();
        if !alert.is_empty() {
            let _ = self.events.send(FrameEvent::Alert(alert));
            hook.reset_alert();
        }
        result
    }

    /// Run the detector when due and declare motion against the alarm bounds
    fn detect_motion(&mut self, image: &mut RgbImage, now: Instant) -> PipelineResult<bool> {
        let alarm = &self.settings.alarm;
        let due = alarm.calibrate
            || self
                .last_detection
                .is_none_or(|t| now.saturating_duration_since(t) >= alarm.processing_interval());
        if !due {
            return Ok(false);
        }
        self.last_detection = Some(now);

        let level = self.engine.process_frame(image).map_err(PipelineError::from)? * alarm.gain;
        self.level = level;
        self.shared.level_bits.store(level.to_bits(), Ordering::SeqCst);

        let triggered = level >= alarm.low && level.min(LEVEL_CEILING) <= alarm.high;
        if triggered {
            self.shared.motion_detected.store(true, Ordering::SeqCst);
            self.shared.motion_latch.store(true, Ordering::SeqCst);
            self.last_motion = Some(now);
            let _ = self.events.send(FrameEvent::Detect { level });
        } else if level < alarm.low {
            self.shared.motion_detected.store(false, Ordering::SeqCst);
        }
        Ok(triggered)
    }

    fn apply_zoom(&mut self, image: RgbImage) -> RgbImage {
        let factor = self.settings.zoom.factor;
        if factor <= 1.0 {
            return image;
        }
        let (w, h) = image.dimensions();
        let focus = *self
            .zoom_focus
            .get_or_insert((w as f32 / 2.0, h as f32 / 2.0));
        let focus = (focus.0.clamp(0.0, w as f32), focus.1.clamp(0.0, h as f32));
        zoom::apply_zoom(&image, factor, focus)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
