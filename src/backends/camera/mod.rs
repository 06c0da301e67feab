// SPDX-License-Identifier: GPL-3.0-only

//! Camera frame sources
//!
//! ```text
//! ┌──────────────────┐   SourceEvent    ┌────────────────┐
//! │  GstFrameSource  │ ───────────────► │   FrameSink    │
//! │ (capture thread) │  Frame/Finished  │ (pipeline tap) │
//! └──────────────────┘                  └────────────────┘
//! ```
//!
//! Each source runs its own [`FrameLoopController`] thread, so cameras never
//! share a capture thread.

pub mod frame_loop;
pub mod source;
pub mod types;

pub use frame_loop::{FrameLoopController, LoopAction};
pub use source::{FrameSink, FrameSource, GstFrameSource, SourceEvent};
pub use types::*;
