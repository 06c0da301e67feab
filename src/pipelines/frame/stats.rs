// SPDX-License-Identifier: GPL-3.0-only

//! Rolling frame-rate statistics

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of inter-frame intervals averaged
pub const FPS_WINDOW: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    last: Option<Instant>,
    intervals: VecDeque<Duration>,
    total: Duration,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame arriving at `at` and return the current average
    pub fn tick(&mut self, at: Instant) -> f64 {
        if let Some(last) = self.last {
            let interval = at.saturating_duration_since(last);
            self.intervals.push_back(interval);
            self.total += interval;
            if self.intervals.len() > FPS_WINDOW
                && let Some(old) = self.intervals.pop_front()
            {
                self.total -= old;
            }
        }
        self.last = Some(at);
        self.fps()
    }

    pub fn fps(&self) -> f64 {
        if self.intervals.is_empty() || self.total.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / self.total.as_secs_f64()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_has_no_rate() {
        let mut counter = FpsCounter::new();
        assert_eq!(counter.tick(Instant::now()), 0.0);
    }

    #[test]
    fn test_steady_rate() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        let mut fps = 0.0;
        for i in 0..10 {
            fps = counter.tick(start + Duration::from_millis(40 * i));
        }
        assert!((fps - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_forgets_old_intervals() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        // One slow interval followed by a full window of fast ones
        counter.tick(start);
        let mut at = start + Duration::from_secs(1);
        counter.tick(at);
        for _ in 0..FPS_WINDOW {
            at += Duration::from_millis(100);
            counter.tick(at);
        }
        assert!((counter.fps() - 10.0).abs() < 1e-6);
    }
}
