// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Monitoring a camera stream with motion detection and recording
//! - Listing available encoders
//! - Decoding audio to raw PCM
//! - Printing the configuration

use camwatch::backends::audio::{AudioReader, parse_filter_list};
use camwatch::config::{CameraSettings, Config, RecordingMode};
use camwatch::constants::{file_formats, timing};
use camwatch::media::encoders::{EncoderAvailability, detect_audio_encoders, detect_video_encoders};
use camwatch::media::writer::{CodecFactory, GstCodecFactory, MemoryCodecFactory, MemoryOptions};
use camwatch::pipelines::CameraRunner;
use camwatch::pipelines::frame::{FrameEvent, FrameRegistry};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Options of the `monitor` command
pub struct MonitorArgs {
    pub source: Option<String>,
    pub camera: Option<String>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub mode: Option<String>,
    pub duration: Option<u64>,
    pub dry_run: bool,
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    })
}

/// Run one camera until the stream ends, the duration passes or Ctrl+C
pub fn monitor(args: MonitorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;

    let mut settings = match args.camera.as_deref() {
        Some(id) => config
            .camera(id)
            .cloned()
            .ok_or_else(|| format!("Camera '{}' not found in configuration", id))?,
        None => config.cameras.first().cloned().unwrap_or_default(),
    };
    if let Some(source) = args.source {
        settings.source = source;
    }
    if settings.source.trim().is_empty() {
        return Err("No source given and none configured".into());
    }
    if let Some(mode) = args.mode.as_deref() {
        settings.recording.mode = RecordingMode::from_name(mode);
    }
    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());

    println!("Camera: {} ({})", settings.name, settings.source);
    describe_source(&settings);
    println!("Recording mode: {:?}", settings.recording.mode);
    println!("Output: {}", output_dir.display());

    let memory = args.dry_run.then(|| MemoryCodecFactory::new(MemoryOptions::default()));
    let factory: Arc<dyn CodecFactory> = match memory.as_ref() {
        Some(memory) => {
            println!("Dry run: nothing is written to disk");
            Arc::new(memory.clone())
        }
        None => Arc::new(GstCodecFactory::new()?),
    };

    let (mut runner, mut events) = CameraRunner::start(
        settings,
        &output_dir,
        config.masks_dir.as_deref(),
        FrameRegistry::new(),
        factory,
    )?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Monitoring... (press Ctrl+C to stop)");

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let rt = tokio::runtime::Runtime::new()?;
    let stats = rt.block_on(async {
        let mut stats = MonitorStats::default();
        let mut last_status = Instant::now();
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping...");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            match tokio::time::timeout(timing::MONITOR_POLL_INTERVAL, events.recv()).await {
                Ok(Some(FrameEvent::PlayingFinished)) => {
                    println!();
                    println!("Stream finished");
                    break;
                }
                Ok(Some(event)) => stats.record(&event),
                Ok(None) => break,
                Err(_) => {}
            }
            if last_status.elapsed() >= timing::STATUS_INTERVAL {
                last_status = Instant::now();
                print!(
                    "\rFrames: {}  Detections: {}  Level: {:.3}  {}",
                    stats.frames,
                    stats.detections,
                    runner.pipeline().motion_level(),
                    if runner.is_recording() { "REC" } else { "   " }
                );
                let _ = std::io::stdout().flush();
            }
        }
        stats
    });
    println!();

    runner.stop();
    println!("Frames: {}, detections: {}, errors: {}", stats.frames, stats.detections, stats.errors);
    for path in runner.recordings() {
        println!("Recording saved: {}", path.display());
    }
    if let Some(memory) = memory {
        for recording in memory.recordings() {
            println!(
                "Dry-run recording {}: {} packets, {} bytes",
                recording.path.display(),
                recording.packets.len(),
                recording.size_bytes()
            );
        }
    }
    Ok(())
}

fn describe_source(settings: &CameraSettings) {
    let is_file = Path::new(&settings.source)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(file_formats::is_video_extension);
    if is_file && !settings.source.contains("://") {
        println!("Source type: file");
    } else {
        println!("Source type: stream");
    }
}

#[derive(Debug, Default)]
struct MonitorStats {
    frames: u64,
    detections: u64,
    errors: u64,
}

impl MonitorStats {
    fn record(&mut self, event: &FrameEvent) {
        match event {
            FrameEvent::Frame(_) => self.frames += 1,
            FrameEvent::Detect { .. } => self.detections += 1,
            FrameEvent::Alert(text) => println!("\nAlert: {}", text),
            FrameEvent::Error(message) => {
                self.errors += 1;
                eprintln!("\nError: {}", message);
            }
            FrameEvent::PlayingFinished => {}
        }
    }
}

/// List encoders and whether their GStreamer elements are installed
pub fn list_encoders() -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    println!("Video encoders:");
    print_encoders(&detect_video_encoders());
    println!();
    println!("Audio encoders:");
    print_encoders(&detect_audio_encoders());
    Ok(())
}

fn print_encoders(encoders: &[EncoderAvailability]) {
    for encoder in encoders {
        println!(
            "  {:<6} {:<18} {:<9} {}",
            encoder.codec,
            encoder.element,
            if encoder.hardware { "hardware" } else { "software" },
            if encoder.available { "available" } else { "missing" }
        );
    }
}

/// Decode `locator` to raw S16LE PCM at the reader's default format
pub fn decode_audio(
    locator: &str,
    output: &Path,
    filters: Option<&str>,
    duration: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = AudioReader::new();
    for filter in filters.map(parse_filter_list).unwrap_or_default() {
        reader.add_filter(&filter.name, &filter.args, &filter.key);
    }

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(output)?);

    let limit = duration.map(|secs| secs as usize * reader.chunk_bytes());
    let mut written = 0usize;
    let mut write_error: Option<std::io::Error> = None;
    let summary = reader.read_samples(locator, |chunk| {
        if let Err(e) = file.write_all(chunk) {
            write_error = Some(e);
            return true;
        }
        written += chunk.len();
        limit.is_some_and(|limit| written >= limit)
    })?;
    if let Some(e) = write_error {
        return Err(e.into());
    }
    file.flush()?;

    println!(
        "Decoded {} chunks ({} bytes, {} Hz mono S16LE) to {}",
        summary.chunks,
        summary.bytes,
        reader.rate(),
        output.display()
    );
    println!("Stopped: {:?}", summary.reason);
    Ok(())
}

/// Print the loaded (or default) configuration as JSON
pub fn print_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.cameras.push(CameraSettings::default());
            config
        }
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
