// SPDX-License-Identifier: GPL-3.0-only

//! Capture backends
//!
//! - [`audio`]: PCM decode and resample from files and network streams
//! - [`camera`]: decoded video frames from files and network streams

pub mod audio;
pub mod camera;
