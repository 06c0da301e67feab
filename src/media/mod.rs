// SPDX-License-Identifier: GPL-3.0-only

//! Media encoding and container output
//!
//! # Encoders
//!
//! The [`encoders`] module holds the encoder tables:
//! - **Video**: H.264, H.265, AV1 with hardware acceleration (NVENC, QSV,
//!   AMF, VA-API) and software fallbacks; VP8, VP9 and MPEG-1 in software
//! - **Audio**: AAC, MP3, Opus and Vorbis at a fixed low bitrate
//!
//! # Containers
//!
//! The [`formats`] module maps output file extensions to muxers.
//!
//! # Writer
//!
//! The [`writer`] module turns frames and PCM into a container file with
//! timestamp reconciliation, interleaving and watchdog-guarded I/O.

pub mod encoders;
pub mod formats;
pub mod writer;

pub use encoders::{AudioCodec, HwPreference, HwVendor, VideoCodec};
pub use formats::ContainerFormat;
pub use writer::{MediaWriter, OpenParams, WriterOptions};
