// SPDX-License-Identifier: GPL-3.0-only

//! External frame-processing hook
//!
//! A hook receives the rotated, masked frame and returns the frame the rest of
//! the chain continues with. How often it runs depends on [`HookMode`].

use crate::errors::PipelineError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long after the last detection a `motion` hook keeps running
pub const RECENT_MOTION_WINDOW: Duration = Duration::from_secs(3);

/// Frame transform supplied by an integrator
pub trait FrameHook: Send {
    fn process_frame(&mut self, frame: &RgbImage) -> Result<RgbImage, PipelineError>;

    /// Alert text produced by the last call, empty when none
    fn alert(&self) -> String {
        String::new()
    }

    fn reset_alert(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
    /// Every frame
    #[default]
    Always,
    /// Frames within [`RECENT_MOTION_WINDOW`] of the last detection
    Motion,
    /// One frame per `trigger_hook()` call
    Trigger,
}

impl HookMode {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "motion" => HookMode::Motion,
            "trigger" => HookMode::Trigger,
            _ => HookMode::Always,
        }
    }

    /// Whether the hook runs for a frame at `now`
    ///
    /// `take_trigger` consumes the pending trigger and is only called in
    /// trigger mode.
    pub fn should_run(
        &self,
        now: Instant,
        last_motion: Option<Instant>,
        take_trigger: impl FnOnce() -> bool,
    ) -> bool {
        match self {
            HookMode::Always => true,
            HookMode::Motion => last_motion
                .is_some_and(|t| now.saturating_duration_since(t) < RECENT_MOTION_WINDOW),
            HookMode::Trigger => take_trigger(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(HookMode::from_name("Motion"), HookMode::Motion);
        assert_eq!(HookMode::from_name("trigger"), HookMode::Trigger);
        assert_eq!(HookMode::from_name("bogus"), HookMode::Always);
    }

    #[test]
    fn test_motion_window() {
        let now = Instant::now() + Duration::from_secs(10);
        let mode = HookMode::Motion;
        assert!(!mode.should_run(now, None, || true));
        assert!(mode.should_run(now, Some(now - Duration::from_secs(2)), || false));
        assert!(!mode.should_run(now, Some(now - Duration::from_secs(4)), || true));
    }

    #[test]
    fn test_trigger_consumed() {
        let mut pending = true;
        let mode = HookMode::Trigger;
        let now = Instant::now();
        assert!(mode.should_run(now, None, || std::mem::take(&mut pending)));
        assert!(!mode.should_run(now, None, || std::mem::take(&mut pending)));
    }
}
