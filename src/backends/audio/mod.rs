// SPDX-License-Identifier: GPL-3.0-only

//! Audio decode and resample
//!
//! [`AudioReader`] pulls PCM out of any file or network source GStreamer can
//! open, through an optional filter chain, at a fixed output format.

pub mod filters;
pub mod reader;

pub use filters::{AudioFilter, parse_filter_list};
pub use reader::{AudioReader, ReadSummary, SourceProtocol, StopReason, locator_to_uri};
