// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer codec backend
//!
//! Each encoder is its own small pipeline:
//!
//! ```text
//! appsrc ─► videoconvert ─► encoder ─► parser ─► appsink     (video)
//! appsrc ─► audioconvert ─► audioresample ─► encoder ─► appsink  (audio)
//! ```
//!
//! The container is a second pipeline with one appsrc per stream feeding a
//! muxer request pad:
//!
//! ```text
//! appsrc (video) ─┐
//!                 ├─► muxer ─► filesink
//! appsrc (audio) ─┘
//! ```
//!
//! Encoded packets travel from the encoder appsinks to the container appsrcs
//! through [`MediaWriter`](super::MediaWriter), which interleaves them.

use super::backend::{
    AudioEncoderParams, CodecFactory, ContainerWriter, Encoder, EncoderInput, Packet, Received,
    StreamInfo, StreamKind, StreamSpec, VideoEncoderParams,
};
use super::timeline::{Rational, rescale};
use super::watchdog::Watchdog;
use crate::errors::{MediaError, MediaResult};
use crate::media::encoders::{EncoderCandidate, audio::configure_audio_encoder, video::configure_video_encoder};
use crate::media::formats::ContainerFormat;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

fn to_clock_time(value: i64, time_base: Rational) -> gst::ClockTime {
    let ns = rescale(value, time_base, Rational::NANOSECONDS).max(0);
    gst::ClockTime::from_nseconds(ns as u64)
}

fn make_element(name: &str) -> MediaResult<gst::Element> {
    gst::ElementFactory::make(name)
        .build()
        .map_err(|e| MediaError::CodecOpen(format!("Failed to create {}: {}", name, e)))
}

/// Pop a pending error off the bus without waiting
fn pending_error(bus: &gst::Bus) -> Option<String> {
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "Pipeline error"
            );
            Some(err.error().to_string())
        }
        _ => None,
    }
}

/// Owned encoder pipeline, set to Null on drop
struct GstEncoder {
    name: String,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    bus: gst::Bus,
    input_time_base: Rational,
    frame_duration: Option<gst::ClockTime>,
    watchdog: Watchdog,
    flushing: bool,
}

impl GstEncoder {
    #[allow(clippy::too_many_arguments)]
    fn build(
        name: &str,
        caps: gst::Caps,
        converters: &[&str],
        encoder: gst::Element,
        parser: Option<&str>,
        input_time_base: Rational,
        frame_duration: Option<gst::ClockTime>,
        watchdog: &Watchdog,
    ) -> MediaResult<Self> {
        let pipeline = gst::Pipeline::new();

        let appsrc = gst_app::AppSrc::builder()
            .caps(&caps)
            .format(gst::Format::Time)
            .build();
        let appsink = gst_app::AppSink::builder().sync(false).build();

        let mut chain: Vec<gst::Element> = vec![appsrc.clone().upcast()];
        for converter in converters {
            chain.push(make_element(converter)?);
        }
        chain.push(encoder);
        if let Some(parser) = parser {
            chain.push(make_element(parser)?);
        }
        chain.push(appsink.clone().upcast());

        pipeline
            .add_many(&chain)
            .map_err(|e| MediaError::CodecOpen(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(&chain)
            .map_err(|e| MediaError::CodecOpen(format!("Failed to link {}: {}", name, e)))?;

        let bus = pipeline
            .bus()
            .ok_or_else(|| MediaError::CodecOpen("Pipeline has no bus".into()))?;

        let encoder = Self {
            name: name.to_string(),
            pipeline,
            appsrc,
            appsink,
            bus,
            input_time_base,
            frame_duration,
            watchdog: watchdog.clone(),
            flushing: false,
        };

        encoder
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MediaError::CodecOpen(format!("Failed to start {}: {}", name, e)))?;
        if let Some(err) = pending_error(&encoder.bus) {
            return Err(MediaError::CodecOpen(format!("{}: {}", name, err)));
        }
        watchdog.check()?;
        Ok(encoder)
    }

    fn sample_to_packet(sample: gst::Sample) -> MediaResult<Packet> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| MediaError::Encode("Sample without buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| MediaError::Encode(format!("Failed to map buffer: {}", e)))?;
        let pts = buffer.pts().map(|t| t.nseconds() as i64).unwrap_or(0);
        let dts = buffer.dts().map(|t| t.nseconds() as i64).unwrap_or(pts);
        Ok(Packet {
            data: map.as_slice().to_vec(),
            pts,
            dts,
            duration: buffer.duration().map(|t| t.nseconds() as i64).unwrap_or(0),
            keyframe: !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT),
            stream_index: 0,
            caps: sample.caps().map(|c| c.to_string()),
        })
    }

    fn check_bus(&self) -> MediaResult<()> {
        match pending_error(&self.bus) {
            Some(err) => Err(MediaError::Encode(format!("{}: {}", self.name, err))),
            None => Ok(()),
        }
    }
}

impl Encoder for GstEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_base(&self) -> Rational {
        Rational::NANOSECONDS
    }

    fn send(&mut self, input: Option<EncoderInput>) -> MediaResult<()> {
        let (data, pts) = match input {
            None => {
                self.flushing = true;
                self.appsrc
                    .end_of_stream()
                    .map_err(|e| MediaError::Encode(format!("Failed to send EOS: {:?}", e)))?;
                return Ok(());
            }
            Some(EncoderInput::Video(frame)) => (frame.data, frame.pts),
            Some(EncoderInput::Audio(frame)) => (frame.samples.to_le_bytes(), frame.pts),
        };

        let mut buffer = gst::Buffer::from_mut_slice(data);
        {
            let buffer = buffer.make_mut();
            buffer.set_pts(to_clock_time(pts, self.input_time_base));
            buffer.set_duration(self.frame_duration);
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| MediaError::Encode(format!("{} refused buffer: {:?}", self.name, e)))?;
        self.check_bus()
    }

    fn receive(&mut self) -> MediaResult<Received> {
        if !self.flushing {
            return match self.appsink.try_pull_sample(gst::ClockTime::ZERO) {
                Some(sample) => Ok(Received::Packet(Self::sample_to_packet(sample)?)),
                None => {
                    self.check_bus()?;
                    Ok(Received::Again)
                }
            };
        }

        loop {
            self.watchdog.check()?;
            if let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::from_mseconds(100)) {
                return Ok(Received::Packet(Self::sample_to_packet(sample)?));
            }
            if self.appsink.is_eos() {
                return Ok(Received::Eos);
            }
            self.check_bus()?;
        }
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, encoder = %self.name, "Failed to set encoder pipeline to Null on drop");
        }
    }
}

struct GstStream {
    appsrc: gst_app::AppSrc,
    caps_set: bool,
}

/// Owned muxer pipeline, set to Null on drop
struct GstContainer {
    pipeline: gst::Pipeline,
    muxer: gst::Element,
    bus: gst::Bus,
    format: ContainerFormat,
    path: PathBuf,
    streams: Vec<GstStream>,
    watchdog: Watchdog,
}

impl GstContainer {
    fn new(path: &Path, format: ContainerFormat, watchdog: &Watchdog) -> MediaResult<Self> {
        info!(path = %path.display(), muxer = %format, "Creating muxer");

        let muxer = gst::ElementFactory::make(format.muxer_name())
            .build()
            .map_err(|e| MediaError::Container(format!("Failed to create {}: {}", format, e)))?;

        // Non-streamable output gets duration and indexes written at the end
        if muxer.has_property("streamable") {
            muxer.set_property("streamable", false);
            debug!(muxer = %format, "Configured muxer with streamable=false");
        }

        let location = path
            .to_str()
            .ok_or_else(|| MediaError::Container(format!("Path is not UTF-8: {}", path.display())))?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", location)
            .build()
            .map_err(|e| MediaError::Container(format!("Failed to create filesink: {}", e)))?;

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([&muxer, &filesink])
            .map_err(|e| MediaError::Container(format!("Failed to add muxer: {}", e)))?;
        muxer
            .link(&filesink)
            .map_err(|e| MediaError::Container(format!("Failed to link muxer: {}", e)))?;
        let bus = pipeline
            .bus()
            .ok_or_else(|| MediaError::Container("Pipeline has no bus".into()))?;

        Ok(Self {
            pipeline,
            muxer,
            bus,
            format,
            path: path.to_path_buf(),
            streams: Vec::new(),
            watchdog: watchdog.clone(),
        })
    }

    fn check_bus(&self) -> MediaResult<()> {
        match pending_error(&self.bus) {
            Some(err) => Err(MediaError::Container(err)),
            None => Ok(()),
        }
    }

    fn wait_for_eos(&self) -> MediaResult<()> {
        loop {
            self.watchdog.check()?;
            let Some(msg) = self.bus.timed_pop_filtered(
                gst::ClockTime::from_mseconds(100),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) else {
                continue;
            };
            match msg.view() {
                gst::MessageView::Eos(_) => return Ok(()),
                gst::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "Muxer error while finishing"
                    );
                    return Err(MediaError::Container(err.error().to_string()));
                }
                _ => {}
            }
        }
    }
}

impl ContainerWriter for GstContainer {
    fn add_stream(&mut self, spec: &StreamSpec) -> MediaResult<StreamInfo> {
        let (video_template, audio_template) = self.format.pad_templates();
        let template = match spec.kind {
            StreamKind::Video => video_template,
            StreamKind::Audio => audio_template,
        };

        let appsrc = gst_app::AppSrc::builder().format(gst::Format::Time).build();
        self.pipeline
            .add(&appsrc)
            .map_err(|e| MediaError::Container(format!("Failed to add appsrc: {}", e)))?;

        let sink_pad = self.muxer.request_pad_simple(template).ok_or_else(|| {
            MediaError::Container(format!("{} has no {} pad for {}", self.format, template, spec.codec))
        })?;
        let src_pad = appsrc
            .static_pad("src")
            .ok_or_else(|| MediaError::Container("appsrc has no src pad".into()))?;
        src_pad
            .link(&sink_pad)
            .map_err(|e| MediaError::Container(format!("Failed to link {} stream: {:?}", spec.codec, e)))?;

        debug!(pad = %sink_pad.name(), codec = %spec.codec, "Linked stream to muxer");
        self.streams.push(GstStream {
            appsrc,
            caps_set: false,
        });
        Ok(StreamInfo {
            index: self.streams.len() - 1,
            time_base: Rational::NANOSECONDS,
        })
    }

    fn write_header(&mut self) -> MediaResult<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MediaError::Container(format!("Failed to start muxer: {}", e)))?;
        self.watchdog.check()?;
        self.check_bus()
    }

    fn write_packet(&mut self, packet: Packet) -> MediaResult<()> {
        self.watchdog.check()?;
        let stream = self
            .streams
            .get_mut(packet.stream_index)
            .ok_or_else(|| MediaError::Container(format!("Unknown stream {}", packet.stream_index)))?;

        if !stream.caps_set {
            let caps_str = packet
                .caps
                .as_deref()
                .ok_or_else(|| MediaError::Container("First packet carries no caps".into()))?;
            let caps = gst::Caps::from_str(caps_str)
                .map_err(|e| MediaError::Container(format!("Invalid caps {}: {}", caps_str, e)))?;
            stream.appsrc.set_caps(Some(&caps));
            stream.caps_set = true;
        }

        let mut buffer = gst::Buffer::from_mut_slice(packet.data);
        {
            let buffer = buffer.make_mut();
            buffer.set_pts(to_clock_time(packet.pts, Rational::NANOSECONDS));
            buffer.set_dts(to_clock_time(packet.dts, Rational::NANOSECONDS));
            if packet.duration > 0 {
                buffer.set_duration(to_clock_time(packet.duration, Rational::NANOSECONDS));
            }
            if !packet.keyframe {
                buffer.set_flags(gst::BufferFlags::DELTA_UNIT);
            }
        }
        stream
            .appsrc
            .push_buffer(buffer)
            .map_err(|e| MediaError::Container(format!("Muxer refused packet: {:?}", e)))?;
        self.check_bus()
    }

    fn finish(&mut self) -> MediaResult<u64> {
        for stream in &self.streams {
            if let Err(e) = stream.appsrc.end_of_stream() {
                warn!(?e, "Failed to send EOS to muxer input");
            }
        }
        let result = self.wait_for_eos();
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, "Failed to set muxer pipeline to Null");
        }
        result?;

        let size = std::fs::metadata(&self.path)?.len();
        info!(path = %self.path.display(), size, "Container finished");
        Ok(size)
    }
}

impl Drop for GstContainer {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, "Failed to set muxer pipeline to Null on drop");
        }
    }
}

/// Encoders and muxers backed by installed GStreamer plugins
#[derive(Debug, Clone, Copy, Default)]
pub struct GstCodecFactory;

impl GstCodecFactory {
    pub fn new() -> MediaResult<Self> {
        gst::init().map_err(|e| MediaError::CodecOpen(format!("Failed to initialize GStreamer: {}", e)))?;
        Ok(Self)
    }
}

impl CodecFactory for GstCodecFactory {
    fn open_video_encoder(
        &self,
        candidate: &EncoderCandidate,
        params: &VideoEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>> {
        let encoder = make_element(candidate.element)?;
        configure_video_encoder(&encoder, candidate.element, &params.tuning);

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", candidate.input_format.gst_format())
            .field("width", params.width as i32)
            .field("height", params.height as i32)
            .field("framerate", gst::Fraction::new(params.frame_rate as i32, 1))
            .build();
        let frame_duration = (params.frame_rate > 0)
            .then(|| gst::ClockTime::from_nseconds(1_000_000_000 / u64::from(params.frame_rate)));

        let encoder = GstEncoder::build(
            candidate.element,
            caps,
            &["videoconvert"],
            encoder,
            params.codec.parser_name(),
            params.time_base,
            frame_duration,
            watchdog,
        )?;
        Ok(Box::new(encoder))
    }

    fn open_audio_encoder(
        &self,
        element: &str,
        params: &AudioEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>> {
        let encoder = make_element(element)?;
        configure_audio_encoder(&encoder, element);

        let caps = gst::Caps::builder("audio/x-raw")
            .field("format", params.codec.sample_format().gst_format())
            .field("layout", "interleaved")
            .field("rate", params.sample_rate as i32)
            .field("channels", params.channels as i32)
            .build();

        let encoder = GstEncoder::build(
            element,
            caps,
            &["audioconvert", "audioresample"],
            encoder,
            params.codec.parser_name(),
            Rational::MILLISECONDS,
            None,
            watchdog,
        )?;
        Ok(Box::new(encoder))
    }

    fn create_container(
        &self,
        path: &Path,
        format: ContainerFormat,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn ContainerWriter>> {
        Ok(Box::new(GstContainer::new(path, format, watchdog)?))
    }
}
