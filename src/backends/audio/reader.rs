// SPDX-License-Identifier: GPL-3.0-only

//! Decode any audio source to fixed-format PCM
//!
//! ```text
//! uridecodebin ─► audioconvert ─► audioresample ─► [filters] ─►
//!     audioconvert ─► audioresample ─► S16LE/rate/channels ─► appsink
//! ```
//!
//! The source is opened and prerolled within the timeout; any failure up to
//! the first decoded sample is fatal. After that, warnings are logged and
//! skipped and the loop ends on end-of-stream, a pipeline error, a read stall
//! or when the chunk callback asks to stop.

use super::filters::AudioFilter;
use crate::errors::{AudioError, AudioResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default output sample rate
pub const DEFAULT_RATE: u32 = 22_050;

/// Default output channel count
pub const DEFAULT_CHANNELS: u32 = 1;

/// Lower bound for open and read timeouts
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Network buffer size for streaming sources
const NETWORK_BUFFER_BYTES: i32 = 2_000_000;

/// How a locator is fetched, which decides the protocol options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProtocol {
    File,
    Http,
    Rtsp,
    Rtmp,
    Mms,
    Other,
}

impl SourceProtocol {
    pub fn from_locator(locator: &str) -> Self {
        let Some((scheme, _)) = locator.split_once("://") else {
            return SourceProtocol::File;
        };
        match scheme.to_ascii_lowercase().as_str() {
            "file" => SourceProtocol::File,
            "http" | "https" => SourceProtocol::Http,
            "rtsp" | "rtsps" | "rtspt" => SourceProtocol::Rtsp,
            "rtmp" | "rtmps" => SourceProtocol::Rtmp,
            "mms" | "mmsh" => SourceProtocol::Mms,
            _ => SourceProtocol::Other,
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, SourceProtocol::File)
    }
}

/// Turn a path or URI into a URI
pub fn locator_to_uri(locator: &str) -> AudioResult<String> {
    if locator.contains("://") {
        return Ok(locator.to_string());
    }
    let path = Path::new(locator);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| AudioError::Open(format!("Failed to resolve {}: {}", locator, e)))?
            .join(path)
    };
    gst::glib::filename_to_uri(&absolute, None)
        .map(|uri| uri.to_string())
        .map_err(|e| AudioError::Open(format!("Invalid path {}: {}", locator, e)))
}

/// Why a read loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    /// The chunk callback returned `true`
    Requested,
    /// A pipeline error or stall after the stream was open
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummary {
    pub chunks: usize,
    pub bytes: usize,
    pub reason: StopReason,
}

/// Split decoded PCM into callback-sized chunks of at most `max` bytes
///
/// Returns `true` as soon as a callback asks to stop.
pub fn deliver_chunks(
    pcm: &[u8],
    max: usize,
    summary: &mut ReadSummary,
    on_chunk: &mut impl FnMut(&[u8]) -> bool,
) -> bool {
    for chunk in pcm.chunks(max.max(1)) {
        if chunk.is_empty() {
            continue;
        }
        summary.chunks += 1;
        summary.bytes += chunk.len();
        if on_chunk(chunk) {
            return true;
        }
    }
    false
}

/// Sets the pipeline to Null however the read ends
struct PipelineGuard(gst::Pipeline);

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.set_state(gst::State::Null) {
            error!(?e, "Failed to set audio pipeline to Null");
        }
        debug!("Audio pipeline released");
    }
}

/// Fixed-format audio decoder
#[derive(Debug, Clone)]
pub struct AudioReader {
    rate: u32,
    channels: u32,
    timeout: Duration,
    filters: Vec<AudioFilter>,
}

impl Default for AudioReader {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioReader {
    pub fn new() -> Self {
        Self::with_format(DEFAULT_RATE, DEFAULT_CHANNELS)
    }

    pub fn with_format(rate: u32, channels: u32) -> Self {
        Self {
            rate: rate.max(1),
            channels: channels.max(1),
            timeout: MIN_TIMEOUT,
            filters: Vec::new(),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Open/read timeout, never below [`MIN_TIMEOUT`]
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout.max(MIN_TIMEOUT);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn add_filter(&mut self, name: &str, args: &str, key: &str) {
        self.filters.push(AudioFilter::new(name, args, key));
    }

    pub fn filters(&self) -> &[AudioFilter] {
        &self.filters
    }

    /// Bytes of one second of output
    pub fn chunk_bytes(&self) -> usize {
        self.rate as usize * 2 * self.channels as usize
    }

    /// `gst::parse::launch` description for `uri`
    pub fn launch_description(&self, uri: &str) -> String {
        let mut description = format!(
            "uridecodebin name=src uri=\"{}\" ! queue ! audioconvert ! audioresample",
            uri.replace('"', "%22")
        );
        for filter in &self.filters {
            description.push_str(" ! ");
            description.push_str(&filter.launch_fragment());
        }
        description.push_str(&format!(
            " ! audioconvert ! audioresample ! \
             audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={} ! \
             appsink name=sink sync=false",
            self.rate, self.channels
        ));
        description
    }

    fn configure_source(source: &gst::Element, protocol: SourceProtocol, timeout: Duration) {
        let set = |name: &str, value: String| {
            if source.has_property(name) {
                source.set_property_from_str(name, &value);
            }
        };
        match protocol {
            SourceProtocol::Rtsp => {
                let micros = timeout.as_micros().to_string();
                set("protocols", "tcp".into());
                set("timeout", micros.clone());
                set("tcp-timeout", micros);
            }
            SourceProtocol::Http | SourceProtocol::Mms | SourceProtocol::Rtmp | SourceProtocol::Other => {
                set("timeout", timeout.as_secs().to_string());
            }
            SourceProtocol::File => {}
        }
        if protocol.is_network() {
            set("blocksize", "4096".into());
        }
        debug!(?protocol, "Configured audio source");
    }

    fn open(&self, uri: &str) -> AudioResult<(PipelineGuard, gst_app::AppSink)> {
        gst::init().map_err(|e| AudioError::Init(format!("GStreamer init failed: {}", e)))?;
        for filter in &self.filters {
            filter.check_available()?;
        }

        let pipeline = gst::parse::launch(&self.launch_description(uri))
            .map_err(|e| AudioError::Open(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| AudioError::Open("Failed to downcast to Pipeline".into()))?;
        let guard = PipelineGuard(pipeline);

        let appsink = guard
            .0
            .by_name("sink")
            .ok_or_else(|| AudioError::Open("Failed to find appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| AudioError::Open("Failed to downcast to AppSink".into()))?;

        let protocol = SourceProtocol::from_locator(uri);
        if let Some(decodebin) = guard.0.by_name("src") {
            if protocol.is_network() && decodebin.has_property("buffer-size") {
                decodebin.set_property("buffer-size", NETWORK_BUFFER_BYTES);
            }
            let timeout = self.timeout;
            decodebin.connect("source-setup", false, move |values| {
                if let Some(source) = values.get(1).and_then(|v| v.get::<gst::Element>().ok()) {
                    Self::configure_source(&source, protocol, timeout);
                }
                None
            });
        }

        guard
            .0
            .set_state(gst::State::Playing)
            .map_err(|e| AudioError::Open(format!("Failed to start pipeline: {}", e)))?;

        Ok((guard, appsink))
    }

    fn bus_error(bus: &gst::Bus) -> Option<String> {
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Warning]) {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "Audio pipeline error"
                    );
                    return Some(err.error().to_string());
                }
                gst::MessageView::Warning(warning) => {
                    warn!(
                        warning = %warning.error(),
                        source = ?warning.src().map(|s| s.name()),
                        "Audio pipeline warning"
                    );
                }
                _ => {}
            }
        }
        None
    }

    fn sample_bytes(sample: &gst::Sample) -> Option<Vec<u8>> {
        let buffer = sample.buffer()?;
        if buffer.flags().contains(gst::BufferFlags::CORRUPTED) {
            debug!("Skipping corrupted audio buffer");
            return None;
        }
        let map = buffer.map_readable().ok()?;
        Some(map.as_slice().to_vec())
    }

    /// Decode `locator` and hand PCM to `on_chunk` until it returns `true`
    ///
    /// Chunks are S16LE at the reader's rate and channel count, at most one
    /// second long and never empty.
    pub fn read_samples(
        &self,
        locator: &str,
        mut on_chunk: impl FnMut(&[u8]) -> bool,
    ) -> AudioResult<ReadSummary> {
        let uri = locator_to_uri(locator)?;
        info!(uri = %uri, rate = self.rate, channels = self.channels, filters = self.filters.len(), "Opening audio source");

        let (guard, appsink) = self.open(&uri)?;
        let bus = guard
            .0
            .bus()
            .ok_or_else(|| AudioError::Open("No bus on pipeline".into()))?;

        // Open phase: the first decoded sample must arrive within the timeout
        let deadline = Instant::now() + self.timeout;
        let first = loop {
            if let Some(err) = Self::bus_error(&bus) {
                return Err(AudioError::Open(err));
            }
            if let Some(sample) = appsink.try_pull_sample(gst::ClockTime::from_mseconds(100)) {
                break sample;
            }
            if appsink.is_eos() || Instant::now() >= deadline {
                return Err(AudioError::Open(
                    "Failed to find an audio stream in input".into(),
                ));
            }
        };
        info!(uri = %uri, "Audio stream open");

        let max = self.chunk_bytes();
        let mut summary = ReadSummary {
            chunks: 0,
            bytes: 0,
            reason: StopReason::EndOfStream,
        };
        let mut pending = Some(first);
        let mut last_data = Instant::now();

        loop {
            let sample = match pending.take() {
                Some(sample) => Some(sample),
                None => appsink.try_pull_sample(gst::ClockTime::from_mseconds(100)),
            };

            match sample {
                Some(sample) => {
                    last_data = Instant::now();
                    if let Some(pcm) = Self::sample_bytes(&sample)
                        && deliver_chunks(&pcm, max, &mut summary, &mut on_chunk)
                    {
                        summary.reason = StopReason::Requested;
                        break;
                    }
                }
                None => {
                    if appsink.is_eos() {
                        summary.reason = StopReason::EndOfStream;
                        break;
                    }
                    if last_data.elapsed() > self.timeout {
                        warn!(uri = %uri, "Audio source stalled");
                        summary.reason = StopReason::Error("Read timeout".into());
                        break;
                    }
                }
            }

            if let Some(err) = Self::bus_error(&bus) {
                summary.reason = StopReason::Error(err);
                break;
            }
        }

        info!(
            uri = %uri,
            chunks = summary.chunks,
            bytes = summary.bytes,
            reason = ?summary.reason,
            "Audio source closed"
        );
        drop(guard);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_detection() {
        assert_eq!(SourceProtocol::from_locator("/tmp/a.wav"), SourceProtocol::File);
        assert_eq!(SourceProtocol::from_locator("RTSP://cam/stream"), SourceProtocol::Rtsp);
        assert_eq!(SourceProtocol::from_locator("https://x/y.mp3"), SourceProtocol::Http);
        assert!(SourceProtocol::from_locator("mmsh://x").is_network());
    }

    #[test]
    fn test_timeout_has_floor() {
        let mut reader = AudioReader::new();
        reader.set_timeout(Duration::from_millis(20));
        assert_eq!(reader.timeout(), MIN_TIMEOUT);
        reader.set_timeout(Duration::from_secs(30));
        assert_eq!(reader.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_chunk_is_one_second() {
        assert_eq!(AudioReader::new().chunk_bytes(), 44_100);
        assert_eq!(AudioReader::with_format(8000, 2).chunk_bytes(), 32_000);
    }

    #[test]
    fn test_launch_description_links_filters_in_order() {
        let mut reader = AudioReader::new();
        reader.add_filter("volume", "volume=0.5", "1");
        reader.add_filter("audiocheblimit", "cutoff=100", "");
        let description = reader.launch_description("file:///a.wav");
        let volume = description.find("name=VOLUME1").unwrap();
        let limit = description.find("name=AUDIOCHEBLIMIT").unwrap();
        assert!(volume < limit);
        assert!(description.contains("format=S16LE"));
        assert!(description.contains("rate=22050,channels=1"));
    }

    #[test]
    fn test_deliver_chunks_splits_and_stops() {
        let mut summary = ReadSummary {
            chunks: 0,
            bytes: 0,
            reason: StopReason::EndOfStream,
        };
        let mut seen = Vec::new();
        let stopped = deliver_chunks(&[0u8; 10], 4, &mut summary, &mut |chunk: &[u8]| {
            seen.push(chunk.len());
            false
        });
        assert!(!stopped);
        assert_eq!(seen, vec![4, 4, 2]);
        assert_eq!(summary.bytes, 10);

        let stopped = deliver_chunks(&[0u8; 10], 4, &mut summary, &mut |_: &[u8]| true);
        assert!(stopped);
        assert_eq!(summary.chunks, 4);
    }

    #[test]
    fn test_uri_passthrough() {
        assert_eq!(locator_to_uri("rtsp://cam/1").unwrap(), "rtsp://cam/1");
    }
}
