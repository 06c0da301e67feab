// SPDX-License-Identifier: GPL-3.0-only

//! camwatch - motion detection and recording for camera streams
//!
//! This library provides the media pipeline of a camera monitor: frame and
//! audio sources, the per-frame transform and motion detection chain, and an
//! audio/video writer with hardware encoder fallback.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame and audio sources built on GStreamer
//! - [`motion`]: Motion detectors, zones and post-processing
//! - [`pipelines`]: Per-frame transforms, recording decisions, camera wiring
//! - [`media`]: Encoder tables, containers and the [`media::MediaWriter`]
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let settings = CameraSettings::new("door", "rtsp://camera.local/stream");
//! let (mut pipeline, events) = FramePipeline::new(settings);
//! if let Some(out) = pipeline.on_frame(frame) {
//!     println!("motion: {} level {:.2}", out.motion, out.level);
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod motion;
pub mod pipelines;

// Re-export commonly used types
pub use backends::camera::{Frame, PixelFormat};
pub use config::{CameraSettings, Config};
pub use errors::{AppError, AppResult};
pub use media::MediaWriter;
pub use motion::MotionEngine;
pub use pipelines::{FrameEvent, FramePipeline};
