// SPDX-License-Identifier: GPL-3.0-only

//! Audio/video file writer
//!
//! [`MediaWriter`] owns one recording session at a time:
//!
//! ```text
//! Closed ──open()──► Open ──close()──► Closed
//!                     │ ▲
//!                     └─┘ write_frame() / write_audio()
//! ```
//!
//! ```text
//! Frame ─► PixelConverter ─► video encoder ─┐
//!                                           ├─► Interleaver ─► container
//! PCM ──► sample buffer ──► audio encoder ──┘
//! ```
//!
//! Encoders and containers come from a [`CodecFactory`], so the same session
//! logic drives GStreamer elements or the in-memory test backend. Every
//! blocking backend call is guarded by a [`Watchdog`]; once it fires the
//! session is failed and only `close()` is accepted.
//!
//! Callers must serialize calls on one writer. Codec construction and
//! teardown across all writers is serialized by [`codec_lock`].

pub mod backend;
pub mod codec_lock;
pub mod convert;
pub mod gst_backend;
pub mod interleave;
pub mod memory;
pub mod timeline;
pub mod watchdog;

pub use backend::{CodecFactory, Packet, StreamKind};
pub use codec_lock::codec_lock;
pub use gst_backend::GstCodecFactory;
pub use memory::{MemoryCodecFactory, MemoryOptions, MemoryRecording};
pub use timeline::Rational;
pub use watchdog::{DEFAULT_WATCHDOG_TIMEOUT, Watchdog};

use crate::backends::camera::types::Frame;
use crate::errors::{MediaError, MediaResult};
use crate::media::encoders::audio::{AUDIO_ENCODER_CHANNELS, AUDIO_ENCODER_RATE};
use crate::media::encoders::{
    AudioCodec, HwPreference, RawVideoFormat, VideoCodec, VideoEncoderTuning, video_encoder_candidates,
};
use crate::media::formats::ContainerFormat;
use backend::{
    AudioEncoderParams, ContainerWriter, Encoder, EncoderInput, RawAudioFrame, RawVideoFrame,
    Received, StreamInfo, StreamSpec, VideoEncoderParams,
};
use chrono::{DateTime, Utc};
use convert::{PixelConverter, convert_samples};
use interleave::Interleaver;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use timeline::rescale;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bytes per input sample of [`MediaWriter::write_audio`] (S16LE mono)
const INPUT_SAMPLE_BYTES: usize = 2;

/// Writer-wide settings that outlive sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterOptions {
    pub hw_preference: HwPreference,
    pub gpu_index: u32,
    pub timeout: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            hw_preference: HwPreference::Auto,
            gpu_index: 0,
            timeout: DEFAULT_WATCHDOG_TIMEOUT,
        }
    }
}

/// Parameters of one recording session
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub video_codec: Option<VideoCodec>,
    /// Frames per second; zero selects variable frame rate timestamps
    pub frame_rate: u32,
    pub audio_codec: Option<AudioCodec>,
    /// Origin of variable frame rate and audio timestamps
    pub created: DateTime<Utc>,
    /// CRF-like quality, lower is better
    pub quality: i32,
}

struct VideoTrack {
    encoder: Box<dyn Encoder>,
    stream: StreamInfo,
    format: RawVideoFormat,
    converter: Option<PixelConverter>,
    frame_rate: u32,
    frame_count: i64,
    last_pts: Option<i64>,
}

struct AudioTrack {
    encoder: Box<dyn Encoder>,
    stream: StreamInfo,
    codec: AudioCodec,
    pending: Vec<u8>,
    /// Last encoder input timestamp, in milliseconds
    last_input_pts: Option<i64>,
    /// Last written packet timestamp, in stream ticks
    last_written_pts: Option<i64>,
    disabled: bool,
}

struct Session {
    id: Uuid,
    path: PathBuf,
    width: u32,
    height: u32,
    created: DateTime<Utc>,
    container: Box<dyn ContainerWriter>,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    interleaver: Interleaver,
    watchdog: Watchdog,
    failed: bool,
}

impl Session {
    /// Write whatever the interleaver can release
    fn flush_ready(&mut self) -> MediaResult<()> {
        while let Some(packet) = self.interleaver.pop_ready() {
            self.watchdog.refresh();
            self.container.write_packet(packet)?;
        }
        Ok(())
    }

    fn queue_video_packet(&mut self, mut packet: Packet) {
        let Some(video) = self.video.as_ref() else {
            return;
        };
        let from = video.encoder.time_base();
        let to = video.stream.time_base;
        packet.pts = rescale(packet.pts, from, to);
        packet.dts = rescale(packet.dts, from, to);
        packet.duration = rescale(packet.duration, from, to);
        packet.stream_index = video.stream.index;
        self.interleaver.push(packet);
        // The interleaver may hold packets back while another track is idle
        self.watchdog.refresh();
    }

    fn queue_audio_packet(&mut self, mut packet: Packet) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let from = audio.encoder.time_base();
        let to = audio.stream.time_base;
        packet.pts = rescale(packet.pts, from, to);
        packet.dts = rescale(packet.dts, from, to);
        packet.duration = rescale(packet.duration, from, to);
        if let Some(last) = audio.last_written_pts
            && packet.pts <= last
        {
            packet.pts = last + 1;
        }
        packet.dts = packet.dts.min(packet.pts);
        audio.last_written_pts = Some(packet.pts);
        packet.stream_index = audio.stream.index;
        self.interleaver.push(packet);
        self.watchdog.refresh();
    }

    /// Pull every ready video packet; blocks until EOS when flushing
    fn drain_video(&mut self, flushing: bool) -> MediaResult<()> {
        loop {
            let received = match self.video.as_mut() {
                Some(video) => video.encoder.receive()?,
                None => return Ok(()),
            };
            match received {
                Received::Packet(packet) => {
                    if flushing && packet.data.is_empty() {
                        continue;
                    }
                    self.queue_video_packet(packet);
                    self.flush_ready()?;
                }
                Received::Again | Received::Eos => return Ok(()),
            }
        }
    }

    /// Like [`Self::drain_video`]; encoder failures are returned separately
    /// from container failures so audio can degrade on its own
    fn drain_audio(&mut self, flushing: bool) -> Result<MediaResult<()>, MediaError> {
        loop {
            let received = match self.audio.as_mut() {
                Some(audio) if !audio.disabled => audio.encoder.receive(),
                _ => return Ok(Ok(())),
            };
            match received {
                Err(e) => return Err(e),
                Ok(Received::Packet(packet)) => {
                    if flushing && packet.data.is_empty() {
                        continue;
                    }
                    self.queue_audio_packet(packet);
                    if let Err(e) = self.flush_ready() {
                        return Ok(Err(e));
                    }
                }
                Ok(Received::Again | Received::Eos) => return Ok(Ok(())),
            }
        }
    }

    /// Stop writing audio for the rest of the session
    fn disable_audio(&mut self, reason: &MediaError) {
        if let Some(audio) = self.audio.as_mut()
            && !audio.disabled
        {
            warn!(session = %self.id, error = %reason, "Audio disabled for the rest of the recording");
            audio.disabled = true;
            audio.pending.clear();
            self.interleaver.retire(audio.stream.index);
        }
    }
}

fn keep_first(slot: &mut Option<MediaError>, session: Uuid, result: MediaResult<()>) {
    if let Err(e) = result {
        warn!(session = %session, error = %e, "Error while closing media writer");
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

/// A reusable audio/video file writer
pub struct MediaWriter {
    factory: Arc<dyn CodecFactory>,
    options: WriterOptions,
    abort: Arc<AtomicBool>,
    session: Option<Session>,
    size_bytes: u64,
}

impl MediaWriter {
    pub fn new(factory: Arc<dyn CodecFactory>, options: WriterOptions) -> Self {
        Self {
            factory,
            options,
            abort: Arc::new(AtomicBool::new(false)),
            session: None,
            size_bytes: 0,
        }
    }

    /// Flag that makes any in-flight or future blocking call fail fast
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Size of the last closed file
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Start a new recording session
    pub fn open(&mut self, params: OpenParams) -> MediaResult<()> {
        if self.session.is_some() {
            return Err(MediaError::AlreadyOpen);
        }
        if params.video_codec.is_some()
            && (params.width == 0
                || params.height == 0
                || params.width % 2 != 0
                || params.height % 2 != 0)
        {
            return Err(MediaError::InvalidDimensions {
                width: params.width,
                height: params.height,
            });
        }

        let watchdog = Watchdog::new(self.options.timeout, Arc::clone(&self.abort));
        watchdog.check()?;

        let id = Uuid::new_v4();
        let format = ContainerFormat::from_path(&params.path);
        info!(
            session = %id,
            path = %params.path.display(),
            container = %format,
            width = params.width,
            height = params.height,
            video = ?params.video_codec,
            audio = ?params.audio_codec,
            fps = params.frame_rate,
            "Opening media writer"
        );

        let mut session = {
            let _guard = codec_lock();
            self.build_session(id, &params, format, watchdog)?
        };

        if let Err(e) = session.container.write_header() {
            warn!(session = %id, error = %e, "Failed to write container header");
            let _guard = codec_lock();
            drop(session);
            return Err(e);
        }
        session.watchdog.refresh();

        self.size_bytes = 0;
        self.session = Some(session);
        Ok(())
    }

    fn build_session(
        &self,
        id: Uuid,
        params: &OpenParams,
        format: ContainerFormat,
        watchdog: Watchdog,
    ) -> MediaResult<Session> {
        let mut container = self.factory.create_container(&params.path, format, &watchdog)?;
        let mut interleaver = Interleaver::new();

        let video = match params.video_codec {
            Some(codec) => {
                let track = self.open_video(codec, params, &watchdog, container.as_mut())?;
                interleaver.add_stream(track.stream.index, track.stream.time_base);
                Some(track)
            }
            None => None,
        };

        let audio = match params.audio_codec {
            Some(codec) => {
                let track = self.open_audio(codec, &watchdog, container.as_mut())?;
                interleaver.add_stream(track.stream.index, track.stream.time_base);
                Some(track)
            }
            None => None,
        };

        Ok(Session {
            id,
            path: params.path.clone(),
            width: params.width,
            height: params.height,
            created: params.created,
            container,
            video,
            audio,
            interleaver,
            watchdog,
            failed: false,
        })
    }

    fn open_video(
        &self,
        codec: VideoCodec,
        params: &OpenParams,
        watchdog: &Watchdog,
        container: &mut dyn ContainerWriter,
    ) -> MediaResult<VideoTrack> {
        let time_base = if params.frame_rate > 0 {
            Rational::per_frame(params.frame_rate)
        } else {
            Rational::MILLISECONDS
        };
        let encoder_params = VideoEncoderParams {
            codec,
            width: params.width,
            height: params.height,
            frame_rate: params.frame_rate,
            time_base,
            tuning: VideoEncoderTuning {
                quality: params.quality,
                gpu_index: self.options.gpu_index,
                keyframe_interval: params.frame_rate.max(1) * 2,
            },
        };

        let mut selected = None;
        for candidate in video_encoder_candidates(codec, self.options.hw_preference) {
            watchdog.check()?;
            match self.factory.open_video_encoder(&candidate, &encoder_params, watchdog) {
                Ok(encoder) => {
                    info!(
                        encoder = %candidate.element,
                        codec = %codec,
                        hardware = candidate.is_hardware(),
                        "Selected video encoder"
                    );
                    selected = Some((encoder, candidate.input_format));
                    break;
                }
                Err(MediaError::Aborted) => return Err(MediaError::Aborted),
                Err(MediaError::TimedOut) => return Err(MediaError::TimedOut),
                Err(e) => {
                    warn!(encoder = %candidate.element, error = %e, "Video encoder rejected");
                }
            }
        }
        let (encoder, format) = selected.ok_or_else(|| {
            MediaError::NoEncoder(format!("Could not open any encoder for {}", codec))
        })?;

        let stream = container.add_stream(&StreamSpec {
            kind: StreamKind::Video,
            time_base,
            width: params.width,
            height: params.height,
            frame_rate: params.frame_rate,
            sample_rate: 0,
            channels: 0,
            codec: codec.to_string(),
        })?;

        Ok(VideoTrack {
            encoder,
            stream,
            format,
            converter: None,
            frame_rate: params.frame_rate,
            frame_count: 0,
            last_pts: None,
        })
    }

    fn open_audio(
        &self,
        codec: AudioCodec,
        watchdog: &Watchdog,
        container: &mut dyn ContainerWriter,
    ) -> MediaResult<AudioTrack> {
        let params = AudioEncoderParams {
            codec,
            sample_rate: AUDIO_ENCODER_RATE,
            channels: AUDIO_ENCODER_CHANNELS,
        };

        let mut selected = None;
        for element in codec.encoders() {
            watchdog.check()?;
            match self.factory.open_audio_encoder(element, &params, watchdog) {
                Ok(encoder) => {
                    info!(encoder = %element, codec = %codec, "Selected audio encoder");
                    selected = Some(encoder);
                    break;
                }
                Err(MediaError::Aborted) => return Err(MediaError::Aborted),
                Err(MediaError::TimedOut) => return Err(MediaError::TimedOut),
                Err(e) => warn!(encoder = %element, error = %e, "Audio encoder rejected"),
            }
        }
        let encoder = selected.ok_or_else(|| {
            MediaError::NoEncoder(format!("Could not open any encoder for {}", codec))
        })?;

        let stream = container.add_stream(&StreamSpec {
            kind: StreamKind::Audio,
            time_base: Rational::MILLISECONDS,
            width: 0,
            height: 0,
            frame_rate: 0,
            sample_rate: AUDIO_ENCODER_RATE,
            channels: AUDIO_ENCODER_CHANNELS,
            codec: codec.to_string(),
        })?;

        Ok(AudioTrack {
            encoder,
            stream,
            codec,
            pending: Vec::new(),
            last_input_pts: None,
            last_written_pts: None,
            disabled: false,
        })
    }

    fn active_session(&mut self) -> MediaResult<&mut Session> {
        let session = self.session.as_mut().ok_or(MediaError::NotOpen)?;
        if session.failed {
            return Err(MediaError::SessionFailed);
        }
        Ok(session)
    }

    /// Encode one video frame
    ///
    /// `timestamp` only matters for variable frame rate sessions; it defaults
    /// to now.
    pub fn write_frame(&mut self, frame: &Frame, timestamp: Option<DateTime<Utc>>) -> MediaResult<()> {
        let session = self.active_session()?;
        if session.video.is_none() {
            return Err(MediaError::NoVideoStream);
        }
        if frame.width != session.width || frame.height != session.height {
            return Err(MediaError::FrameSizeMismatch {
                expected: (session.width, session.height),
                actual: (frame.width, frame.height),
            });
        }

        let result = Self::encode_frame(session, frame, timestamp);
        if result.is_err() {
            session.failed = true;
        }
        result
    }

    fn encode_frame(session: &mut Session, frame: &Frame, timestamp: Option<DateTime<Utc>>) -> MediaResult<()> {
        session.watchdog.check()?;
        let created = session.created;
        let Some(video) = session.video.as_mut() else {
            return Err(MediaError::NoVideoStream);
        };

        let (width, height, format) = (frame.width, frame.height, video.format);
        let converter = video
            .converter
            .get_or_insert_with(|| PixelConverter::new(width, height, format));
        let data = converter.convert(frame)?;

        let mut pts = if video.frame_rate > 0 {
            video.frame_count
        } else {
            let at = timestamp.unwrap_or_else(Utc::now);
            (at - created).num_milliseconds()
        };
        if let Some(last) = video.last_pts
            && pts <= last
        {
            debug!(pts, last, "Non-increasing video timestamp bumped");
            pts = last + 1;
        }

        video.encoder.send(Some(EncoderInput::Video(RawVideoFrame {
            data,
            format,
            width,
            height,
            pts,
        })))?;
        video.frame_count += 1;
        video.last_pts = Some(pts);

        session.drain_video(false)
    }

    /// Queue S16LE mono PCM captured at `timestamp`
    ///
    /// Audio is best-effort: encoder failures disable the audio track for the
    /// rest of the session and are not returned. Container failures are.
    pub fn write_audio(&mut self, pcm: &[u8], timestamp: DateTime<Utc>) -> MediaResult<()> {
        let session = self.active_session()?;
        let created = session.created;
        let Some(audio) = session.audio.as_mut() else {
            return Ok(());
        };
        if audio.disabled {
            return Ok(());
        }
        audio.pending.extend_from_slice(pcm);

        let base_ms = (timestamp - created).num_milliseconds();
        let result = Self::encode_audio(session, base_ms);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(container_err)) => {
                session.failed = true;
                Err(container_err)
            }
            Err(MediaError::Aborted) => {
                session.failed = true;
                Err(MediaError::Aborted)
            }
            Err(MediaError::TimedOut) => {
                session.failed = true;
                Err(MediaError::TimedOut)
            }
            Err(encode_err) => {
                session.disable_audio(&encode_err);
                Ok(())
            }
        }
    }

    fn encode_audio(session: &mut Session, base_ms: i64) -> Result<MediaResult<()>, MediaError> {
        session.watchdog.check()?;
        let mut consumed_samples: i64 = 0;
        loop {
            let Some(audio) = session.audio.as_mut() else {
                return Ok(Ok(()));
            };
            let chunk_bytes = audio.codec.frame_size() * INPUT_SAMPLE_BYTES;
            if audio.pending.len() < chunk_bytes {
                return Ok(Ok(()));
            }

            let samples = convert_samples(&audio.pending[..chunk_bytes], audio.codec.sample_format());
            audio.pending.drain(..chunk_bytes);

            let supplied = base_ms + consumed_samples * 1000 / i64::from(AUDIO_ENCODER_RATE);
            let pts = match audio.last_input_pts {
                Some(last) => supplied.max(last + 1),
                None => supplied,
            };
            audio.last_input_pts = Some(pts);
            consumed_samples += audio.codec.frame_size() as i64;

            audio
                .encoder
                .send(Some(EncoderInput::Audio(RawAudioFrame { samples, pts })))?;
            if let Err(e) = session.drain_audio(false)? {
                return Ok(Err(e));
            }
        }
    }

    /// Flush encoders, write the trailer and release everything
    ///
    /// Safe to call repeatedly; closing a closed writer does nothing.
    pub fn close(&mut self) -> MediaResult<()> {
        let aborted = self.abort.swap(false, Ordering::AcqRel);
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.watchdog.refresh();

        let id = session.id;
        let mut first_error: Option<MediaError> = None;

        if session.failed || aborted {
            debug!(session = %session.id, "Skipping flush of failed session");
        } else {
            if let Some(video) = session.video.as_mut() {
                let sent = video.encoder.send(None);
                keep_first(&mut first_error, id, sent.and_then(|_| session.drain_video(true)));
            }

            let audio_flush = match session.audio.as_mut() {
                Some(audio) if !audio.disabled => audio.encoder.send(None).map(|_| true),
                _ => Ok(false),
            };
            match audio_flush {
                Ok(true) => match session.drain_audio(true) {
                    Ok(container_result) => keep_first(&mut first_error, id, container_result),
                    Err(e) => session.disable_audio(&e),
                },
                Ok(false) => {}
                Err(e) => session.disable_audio(&e),
            }

            for packet in session.interleaver.drain_all() {
                if first_error.is_some() {
                    break;
                }
                session.watchdog.refresh();
                keep_first(&mut first_error, id, session.container.write_packet(packet));
            }

            match session.container.finish() {
                Ok(size) => self.size_bytes = size,
                Err(e) => keep_first(&mut first_error, id, Err(e)),
            }
        }

        {
            let _guard = codec_lock();
            info!(
                session = %session.id,
                path = %session.path.display(),
                size = self.size_bytes,
                "Media writer closed"
            );
            drop(session);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for MediaWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close media writer on drop");
        }
    }
}
