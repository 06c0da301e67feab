// SPDX-License-Identifier: GPL-3.0-only

//! Liveness watchdog for blocking encode and container I/O
//!
//! Every blocking loop in a backend calls [`Watchdog::check`] between waits.
//! The check fails once no packet has been written for longer than the
//! timeout, or immediately after the abort flag is raised. A session whose
//! watchdog fired is unusable and must be closed.

use crate::errors::{MediaError, MediaResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct Watchdog {
    origin: Instant,
    /// Milliseconds since `origin` of the last written packet
    last_packet_ms: Arc<AtomicU64>,
    timeout: Duration,
    abort: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new(timeout: Duration, abort: Arc<AtomicBool>) -> Self {
        Self {
            origin: Instant::now(),
            last_packet_ms: Arc::new(AtomicU64::new(0)),
            timeout,
            abort,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Record that a packet was just written
    pub fn refresh(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_packet_ms.store(now, Ordering::Release);
    }

    /// Time since the last written packet
    pub fn idle(&self) -> Duration {
        let last = self.last_packet_ms.load(Ordering::Acquire);
        self.origin
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    /// Fail when aborted or stalled
    pub fn check(&self) -> MediaResult<()> {
        if self.abort.load(Ordering::Acquire) {
            warn!("Writer aborted");
            return Err(MediaError::Aborted);
        }
        let idle = self.idle();
        if idle > self.timeout {
            warn!(
                idle_ms = idle.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "Writer watchdog timeout"
            );
            return Err(MediaError::TimedOut);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_watchdog_passes() {
        let watchdog = Watchdog::new(DEFAULT_WATCHDOG_TIMEOUT, Arc::new(AtomicBool::new(false)));
        assert!(watchdog.check().is_ok());
    }

    #[test]
    fn test_abort_fails_immediately() {
        let abort = Arc::new(AtomicBool::new(false));
        let watchdog = Watchdog::new(Duration::from_secs(3600), Arc::clone(&abort));
        abort.store(true, Ordering::Release);
        assert_eq!(watchdog.check(), Err(MediaError::Aborted));
    }

    #[test]
    fn test_stall_times_out_and_refresh_recovers() {
        let watchdog = Watchdog::new(Duration::from_millis(20), Arc::new(AtomicBool::new(false)));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(watchdog.check(), Err(MediaError::TimedOut));
        watchdog.refresh();
        assert!(watchdog.check().is_ok());
    }
}
