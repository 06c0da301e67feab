// SPDX-License-Identifier: GPL-3.0-only

//! In-memory codec backend
//!
//! Encoders pass every input frame through as one packet, optionally held
//! back by a fixed latency. Containers keep every stream and packet in a
//! shared list instead of writing a file. Used by the test-suite and by
//! `monitor --dry-run`.

use super::backend::{
    AudioEncoderParams, CodecFactory, ContainerWriter, Encoder, EncoderInput, Packet, Received,
    StreamInfo, StreamSpec, VideoEncoderParams,
};
use super::timeline::Rational;
use super::watchdog::Watchdog;
use crate::errors::{MediaError, MediaResult};
use crate::media::encoders::EncoderCandidate;
use crate::media::formats::ContainerFormat;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Behaviour knobs of the in-memory backend
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Frames a video encoder holds before emitting the first packet
    pub video_latency: usize,
    /// Encoder elements that fail to open
    pub unavailable: HashSet<String>,
    /// Block in `write_header` until the watchdog fires
    pub stall_header: bool,
    /// Audio encoders fail every send after this many frames
    pub fail_audio_after: Option<usize>,
}

/// Everything written to one container
#[derive(Debug, Clone, Default)]
pub struct MemoryRecording {
    pub path: PathBuf,
    pub format: ContainerFormat,
    pub streams: Vec<(StreamSpec, StreamInfo)>,
    pub packets: Vec<Packet>,
    pub header_written: bool,
    pub trailer_written: bool,
}

impl MemoryRecording {
    /// Packets of one stream in write order
    pub fn stream_packets(&self, index: usize) -> Vec<&Packet> {
        self.packets
            .iter()
            .filter(|p| p.stream_index == index)
            .collect()
    }

    pub fn size_bytes(&self) -> u64 {
        self.packets.iter().map(|p| p.data.len() as u64).sum()
    }
}

#[derive(Debug, Default)]
struct Shared {
    recordings: Vec<MemoryRecording>,
    opened_encoders: Vec<String>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCodecFactory {
    options: MemoryOptions,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryCodecFactory {
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Snapshot of every container created so far
    pub fn recordings(&self) -> Vec<MemoryRecording> {
        lock(&self.shared).recordings.clone()
    }

    /// Encoder elements that opened successfully, in order
    pub fn opened_encoders(&self) -> Vec<String> {
        lock(&self.shared).opened_encoders.clone()
    }

    fn check_available(&self, element: &str) -> MediaResult<()> {
        if self.options.unavailable.contains(element) {
            return Err(MediaError::CodecOpen(format!("{} is not available", element)));
        }
        lock(&self.shared).opened_encoders.push(element.to_string());
        Ok(())
    }
}

impl CodecFactory for MemoryCodecFactory {
    fn open_video_encoder(
        &self,
        candidate: &EncoderCandidate,
        params: &VideoEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>> {
        watchdog.check()?;
        self.check_available(candidate.element)?;
        Ok(Box::new(PassThroughEncoder {
            name: candidate.element.to_string(),
            time_base: params.time_base,
            latency: self.options.video_latency,
            keyframe_interval: i64::from(params.tuning.keyframe_interval.max(1)),
            frame_duration: if params.frame_rate > 0 { 1 } else { 0 },
            queue: VecDeque::new(),
            sent: 0,
            fail_after: None,
            flushing: false,
        }))
    }

    fn open_audio_encoder(
        &self,
        element: &str,
        params: &AudioEncoderParams,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn Encoder>> {
        watchdog.check()?;
        self.check_available(element)?;
        let frame_ms = params.codec.frame_size() as i64 * 1000 / i64::from(params.sample_rate.max(1));
        Ok(Box::new(PassThroughEncoder {
            name: element.to_string(),
            time_base: Rational::MILLISECONDS,
            latency: 0,
            keyframe_interval: 1,
            frame_duration: frame_ms,
            queue: VecDeque::new(),
            sent: 0,
            fail_after: self.options.fail_audio_after,
            flushing: false,
        }))
    }

    fn create_container(
        &self,
        path: &Path,
        format: ContainerFormat,
        watchdog: &Watchdog,
    ) -> MediaResult<Box<dyn ContainerWriter>> {
        watchdog.check()?;
        let mut shared = lock(&self.shared);
        shared.recordings.push(MemoryRecording {
            path: path.to_path_buf(),
            format,
            ..Default::default()
        });
        Ok(Box::new(MemoryContainer {
            index: shared.recordings.len() - 1,
            shared: Arc::clone(&self.shared),
            stall_header: self.options.stall_header,
            watchdog: watchdog.clone(),
        }))
    }
}

struct PassThroughEncoder {
    name: String,
    time_base: Rational,
    latency: usize,
    keyframe_interval: i64,
    frame_duration: i64,
    queue: VecDeque<(Vec<u8>, i64)>,
    sent: usize,
    fail_after: Option<usize>,
    flushing: bool,
}

impl Encoder for PassThroughEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send(&mut self, input: Option<EncoderInput>) -> MediaResult<()> {
        if self.flushing {
            return Err(MediaError::Encode(format!("{} is already flushing", self.name)));
        }
        if self.fail_after.is_some_and(|limit| self.sent >= limit) {
            return Err(MediaError::Encode(format!("{} rejected frame {}", self.name, self.sent)));
        }
        match input {
            None => self.flushing = true,
            Some(EncoderInput::Video(frame)) => self.queue.push_back((frame.data, frame.pts)),
            Some(EncoderInput::Audio(frame)) => {
                self.queue.push_back((frame.samples.to_le_bytes(), frame.pts))
            }
        }
        if !self.flushing {
            self.sent += 1;
        }
        Ok(())
    }

    fn receive(&mut self) -> MediaResult<Received> {
        if !self.flushing && self.queue.len() <= self.latency {
            return Ok(Received::Again);
        }
        let Some((data, pts)) = self.queue.pop_front() else {
            return Ok(Received::Eos);
        };
        Ok(Received::Packet(Packet {
            data,
            pts,
            dts: pts,
            duration: self.frame_duration,
            keyframe: pts % self.keyframe_interval == 0,
            stream_index: 0,
            caps: None,
        }))
    }
}

struct MemoryContainer {
    index: usize,
    shared: Arc<Mutex<Shared>>,
    stall_header: bool,
    watchdog: Watchdog,
}

impl MemoryContainer {
    fn with_recording<T>(&self, f: impl FnOnce(&mut MemoryRecording) -> T) -> MediaResult<T> {
        let mut shared = lock(&self.shared);
        shared
            .recordings
            .get_mut(self.index)
            .map(f)
            .ok_or_else(|| MediaError::Container("Recording vanished".into()))
    }
}

impl ContainerWriter for MemoryContainer {
    fn add_stream(&mut self, spec: &StreamSpec) -> MediaResult<StreamInfo> {
        self.with_recording(|rec| {
            let info = StreamInfo {
                index: rec.streams.len(),
                time_base: spec.time_base,
            };
            rec.streams.push((spec.clone(), info));
            info
        })
    }

    fn write_header(&mut self) -> MediaResult<()> {
        while self.stall_header {
            self.watchdog.check()?;
            std::thread::sleep(Duration::from_millis(5));
        }
        self.watchdog.check()?;
        self.with_recording(|rec| rec.header_written = true)
    }

    fn write_packet(&mut self, packet: Packet) -> MediaResult<()> {
        self.watchdog.check()?;
        self.with_recording(|rec| {
            if !rec.header_written {
                return Err(MediaError::Container("Packet written before header".into()));
            }
            rec.packets.push(packet);
            Ok(())
        })?
    }

    fn finish(&mut self) -> MediaResult<u64> {
        let size = self.with_recording(|rec| {
            rec.trailer_written = true;
            rec.size_bytes()
        })?;
        debug!(index = self.index, size, "Memory container finished");
        Ok(size)
    }
}
