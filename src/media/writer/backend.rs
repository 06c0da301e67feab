// SPDX-License-Identifier: GPL-3.0-only

//! Codec and container abstraction
//!
//! [`MediaWriter`](super::MediaWriter) only talks to these traits. The
//! GStreamer backend drives real encoder and muxer elements; the in-memory
//! backend records what would have been written.
//!
//! Every blocking call a backend makes must poll the [`Watchdog`] it was
//! handed so stalls and aborts turn into errors instead of hangs.

use super::convert::AudioSamples;
use super::timeline::Rational;
use super::watchdog::Watchdog;
use crate::errors::MediaResult;
use crate::media::encoders::{AudioCodec, EncoderCandidate, RawVideoFormat, VideoCodec, VideoEncoderTuning};
use crate::media::formats::ContainerFormat;
use std::path::Path;

/// One encoded packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub keyframe: bool,
    pub stream_index: usize,
    /// Serialized caps of the encoder output, when the backend has them
    pub caps: Option<String>,
}

/// A raw planar video frame
#[derive(Debug, Clone)]
pub struct RawVideoFrame {
    pub data: Vec<u8>,
    pub format: RawVideoFormat,
    pub width: u32,
    pub height: u32,
    /// In the encoder's input time base
    pub pts: i64,
}

/// One encoder input frame of mono audio
#[derive(Debug, Clone)]
pub struct RawAudioFrame {
    pub samples: AudioSamples,
    /// In milliseconds
    pub pts: i64,
}

#[derive(Debug, Clone)]
pub enum EncoderInput {
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
}

/// Result of polling an encoder for output
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Packet(Packet),
    /// Nothing ready until more input is sent
    Again,
    /// Fully flushed
    Eos,
}

/// An opened encoder
///
/// `send(None)` starts flushing. Once flushing, `receive` blocks until it can
/// return a packet or [`Received::Eos`].
pub trait Encoder: Send {
    /// Element name, for logs
    fn name(&self) -> &str;

    /// Time base of produced packet timestamps
    fn time_base(&self) -> Rational;

    fn send(&mut self, input: Option<EncoderInput>) -> MediaResult<()>;

    fn receive(&mut self) -> MediaResult<Received>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Stream to add to a container
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    pub kind: StreamKind,
    /// Preferred time base; the container may pick another
    pub time_base: Rational,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub sample_rate: u32,
    pub channels: u32,
    /// Codec display name
    pub codec: String,
}

/// Stream as created by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub time_base: Rational,
}

/// An output container being written
pub trait ContainerWriter: Send {
    fn add_stream(&mut self, spec: &StreamSpec) -> MediaResult<StreamInfo>;

    fn write_header(&mut self) -> MediaResult<()>;

    /// Write one packet with timestamps in its stream's time base
    fn write_packet(&mut self, packet: Packet) -> MediaResult<()>;

    /// Write the trailer and return the output size in bytes
    fn finish(&mut self) -> MediaResult<u64>;
}

/// Video encoder parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoEncoderParams {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Zero for variable frame rate
    pub frame_rate: u32,
    /// Time base of input frame timestamps
    pub time_base: Rational,
    pub tuning: VideoEncoderTuning,
}

/// Audio encoder parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEncoderParams {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Creates encoders and containers for one backend
pub trait CodecFactory: Send + Sync {
    fn open_video_encoder(
        &self,
        candidate: &EncoderCandidate,
        params: &VideoEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>>;

    fn open_audio_encoder(
        &self,
        element: &str,
        params: &AudioEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>>;

    fn create_container(
        &self,
        path: &Path,
        format: ContainerFormat,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn ContainerWriter>>;
}
