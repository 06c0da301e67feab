// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camwatch::constants::{file_formats, motion, overlay, recording};

#[test]
fn test_alarm_defaults_are_ordered() {
    assert!(motion::DEFAULT_ALARM_LOW > 0.0);
    assert!(motion::DEFAULT_ALARM_LOW < motion::DEFAULT_ALARM_HIGH);
    assert!(motion::LEVEL_CEILING < motion::DEFAULT_ALARM_HIGH);
}

#[test]
fn test_video_extensions() {
    assert!(file_formats::is_video_extension("mp4"));
    assert!(file_formats::is_video_extension("MKV"));
    assert!(!file_formats::is_video_extension("jpg"));
}

#[test]
fn test_file_timestamp_has_no_separators() {
    // Used in file names
    assert!(!recording::FILE_TIMESTAMP_FORMAT.contains(':'));
    assert!(!recording::FILE_TIMESTAMP_FORMAT.contains('/'));
}

#[test]
fn test_font_search_paths() {
    assert!(!overlay::FONT_SEARCH_PATHS.is_empty());
    for path in overlay::FONT_SEARCH_PATHS {
        assert!(
            path.ends_with(".ttf"),
            "Font path {} is not a TrueType file",
            path
        );
    }
}
