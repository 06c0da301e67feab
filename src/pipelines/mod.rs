// SPDX-License-Identifier: GPL-3.0-only

//! Per-camera processing
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌─────────────────────┐
//! │ Frame Source │ ──▶ │  Frame Pipeline   │ ──▶ │ Recording Controller│
//! │  (thread)    │     │  - Rotate/mask    │     │  - always/motion/   │
//! │              │     │  - Hook           │     │    trigger          │
//! │              │     │  - Motion engine  │     │  - MediaWriter      │
//! │              │     │  - Fisheye/zoom   │     │                     │
//! │              │     │  - PiP/overlay    │     │                     │
//! └──────────────┘     └─────────┬─────────┘     └──────────▲──────────┘
//!                                │ FrameEvent               │ PCM
//!                                ▼                          │
//!                          observers                  Audio Reader
//! ```
//!
//! # Modules
//!
//! - [`frame`]: the per-frame transform chain and its events
//! - [`recording`]: when to record and what to write
//! - [`camera`]: wiring of one running camera

pub mod camera;
pub mod frame;
pub mod recording;

pub use camera::CameraRunner;
pub use frame::{FrameEvent, FramePipeline, PipelineHandle, ProcessedFrame};
pub use recording::RecordingController;
