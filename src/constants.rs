// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Directory name under the user config and video folders
pub const APP_NAME: &str = "camwatch";

/// Configuration file name
pub const CONFIG_FILE: &str = "config.json";

/// Motion alarm defaults
pub mod motion {
    /// Minimum motion level that counts as an alarm
    pub const DEFAULT_ALARM_LOW: f64 = 0.005;

    /// Maximum motion level that counts as an alarm
    pub const DEFAULT_ALARM_HIGH: f64 = 1.0;

    pub const DEFAULT_GAIN: f64 = 1.0;

    /// Run the detector on every frame
    pub const DEFAULT_PROCESSING_INTERVAL_MS: u64 = 0;

    /// Levels are clamped to this before the high threshold comparison
    pub const LEVEL_CEILING: f64 = 0.99;
}

/// Recording defaults
pub mod recording {
    pub const DEFAULT_POST_MOTION_SECS: u64 = 10;

    pub const DEFAULT_MAX_RECORD_SECS: u64 = 600;

    pub const DEFAULT_QUALITY: i32 = 23;

    pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 5_000;

    /// chrono format of the timestamp in recording file names
    pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
}

/// Overlay rendering
pub mod overlay {
    /// Rendered instead of a template with invalid strftime fields
    pub const INVALID_TIMESTAMP: &str = "Invalid Timestamp";

    /// Extra width added to the measured text extent
    pub const TEXT_PADDING: u32 = 5;

    /// Opacity of the text background rectangle
    pub const BACKGROUND_ALPHA: u8 = 128;

    /// Fonts tried when none is configured
    pub const FONT_SEARCH_PATHS: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];
}

/// Frame source and monitor loop timing
pub mod timing {
    use super::Duration;

    /// How long a capture loop waits for one sample
    pub const SAMPLE_PULL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Event poll interval of the monitor command
    pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Interval of the status line printed by the monitor command
    pub const STATUS_INTERVAL: Duration = Duration::from_secs(1);
}

pub mod file_formats {
    /// Video file extensions a frame source accepts as local files
    pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "ts", "mpg", "flv"];

    /// Check if extension is a video format
    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}
