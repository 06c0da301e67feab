// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{self, motion as motion_defaults, recording as recording_defaults};
use crate::errors::{ConfigError, ConfigResult};
use crate::media::encoders::{AudioCodec, HwPreference, VideoCodec};
use crate::media::formats::ContainerFormat;
use crate::motion::{MotionSettings, ZoneRect};
use crate::pipelines::frame::{FisheyeSettings, HookMode, OverlaySettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// When a camera writes to disk
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// Never record
    Off,
    /// From the first frame
    Always,
    /// While motion is detected, plus the post-motion time
    #[default]
    OnMotion,
    /// After an external trigger, for the post-motion time
    OnTrigger,
}

impl RecordingMode {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "always" => RecordingMode::Always,
            "on_motion" | "motion" => RecordingMode::OnMotion,
            "on_trigger" | "trigger" => RecordingMode::OnTrigger,
            _ => RecordingMode::Off,
        }
    }
}

/// Motion alarm thresholds and detector cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSettings {
    pub low: f64,
    pub high: f64,
    pub gain: f64,
    /// Minimum time between detector runs
    pub processing_interval_ms: u64,
    /// Run the detector on every frame regardless of the interval
    pub calibrate: bool,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            low: motion_defaults::DEFAULT_ALARM_LOW,
            high: motion_defaults::DEFAULT_ALARM_HIGH,
            gain: motion_defaults::DEFAULT_GAIN,
            processing_interval_ms: motion_defaults::DEFAULT_PROCESSING_INTERVAL_MS,
            calibrate: false,
        }
    }
}

impl AlarmSettings {
    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomSettings {
    pub factor: f32,
    /// Focus point in pixels, frame center when unset
    pub focus: Option<(f32, f32)>,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            factor: 1.0,
            focus: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub mode: RecordingMode,
    pub post_motion_secs: u64,
    /// Recordings longer than this are split, 0 disables splitting
    pub max_record_secs: u64,
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: Option<AudioCodec>,
    /// Output file extension, which selects the container
    pub container: String,
    /// CRF-like quality, lower is better
    pub quality: i32,
    /// Zero records with wall-clock timestamps
    pub frame_rate: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            mode: RecordingMode::default(),
            post_motion_secs: recording_defaults::DEFAULT_POST_MOTION_SECS,
            max_record_secs: recording_defaults::DEFAULT_MAX_RECORD_SECS,
            video_codec: Some(VideoCodec::H264),
            audio_codec: None,
            container: ContainerFormat::default().extension().to_string(),
            quality: recording_defaults::DEFAULT_QUALITY,
            frame_rate: 0,
        }
    }
}

impl RecordingSettings {
    pub fn container_format(&self) -> ContainerFormat {
        ContainerFormat::from_extension(&self.container).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// `auto`, `software`, or a vendor name (`nvidia`, `quicksync`, `amd`, `vaapi`)
    pub hw_preference: String,
    pub gpu_index: u32,
    pub watchdog_timeout_ms: u64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            hw_preference: "auto".to_string(),
            gpu_index: 0,
            watchdog_timeout_ms: recording_defaults::DEFAULT_WATCHDOG_TIMEOUT_MS,
        }
    }
}

impl EncoderSettings {
    pub fn preference(&self) -> HwPreference {
        HwPreference::from_name(&self.hw_preference)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Audio locator, empty for none
    pub source: String,
    /// `name|args|key;...`
    pub filters: String,
}

/// Everything configurable about one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub id: String,
    pub name: String,
    /// File path or URI of the video source
    pub source: String,
    /// `Rotate<deg>Flip<axis>` name
    pub rotate_mode: String,
    /// Mask image, absolute or relative to the masks directory
    pub mask_path: String,
    pub motion: MotionSettings,
    pub motion_zones: Vec<ZoneRect>,
    pub alarm: AlarmSettings,
    pub fisheye: FisheyeSettings,
    pub zoom: ZoomSettings,
    pub overlay: OverlaySettings,
    /// `id,x,y,w,h|...` in percent
    pub pip: String,
    /// `key=value;...`
    pub tags: String,
    pub hook_mode: HookMode,
    pub recording: RecordingSettings,
    pub encoder: EncoderSettings,
    pub audio: AudioSettings,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            id: "camera-1".to_string(),
            name: "Camera 1".to_string(),
            source: String::new(),
            rotate_mode: "RotateNoneFlipNone".to_string(),
            mask_path: String::new(),
            motion: MotionSettings::default(),
            motion_zones: Vec::new(),
            alarm: AlarmSettings::default(),
            fisheye: FisheyeSettings::default(),
            zoom: ZoomSettings::default(),
            overlay: OverlaySettings::default(),
            pip: String::new(),
            tags: String::new(),
            hook_mode: HookMode::default(),
            recording: RecordingSettings::default(),
            encoder: EncoderSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl CameraSettings {
    pub fn new(id: &str, source: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            source: source.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cameras: Vec<CameraSettings>,
    /// Where recordings are written
    pub output_dir: PathBuf,
    /// Base directory for relative mask paths
    pub masks_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            output_dir: default_output_dir(),
            masks_dir: dirs::config_dir().map(|d| d.join(constants::APP_NAME).join("masks")),
        }
    }
}

/// Recordings directory under the user's video folder
pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(constants::APP_NAME)
}

impl Config {
    /// `<config dir>/camwatch/config.json`
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(constants::APP_NAME).join(constants::CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from `path`, or the default configuration when it does not exist
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        info!(path = %path.display(), cameras = config.cameras.len(), "Config loaded");
        Ok(config)
    }

    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&Self::default_path()?)
    }

    /// Write pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn camera(&self, id: &str) -> Option<&CameraSettings> {
        self.cameras.iter().find(|c| c.id == id)
    }
}
