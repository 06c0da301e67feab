// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for frame delivery loops
//!
//! Every camera source delivers frames from its own thread. The loop body is
//! a closure that pulls one frame and says whether to keep going; the
//! controller owns the thread and the stop signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Owner of a frame loop thread
///
/// ```ignore
/// let mut controller = FrameLoopController::start_with_init(
///     "camera-1",
///     || open_pipeline(),
///     |pipeline| match pipeline.pull() {
///         Some(frame) => { deliver(frame); LoopAction::Continue }
///         None => LoopAction::Stop,
///     },
/// );
/// controller.stop();
/// ```
pub struct FrameLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoopController {
    /// Spawn a loop that runs `loop_fn` until it returns [`LoopAction::Stop`]
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Spawn a loop whose state is built on the loop thread
    ///
    /// When `init_fn` fails the thread exits without running `loop_fn` and
    /// `on_init_error` receives the message.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, loop_fn: F) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        Self::spawn(name, init_fn, loop_fn, |_| {})
    }

    /// Like [`Self::start_with_init`], reporting initialization failures
    pub fn spawn<S, I, F, E>(name: &str, init_fn: I, mut loop_fn: F, on_init_error: E) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting frame loop");

        let thread_handle = thread::spawn(move || {
            let mut state = match init_fn() {
                Ok(state) => state,
                Err(e) => {
                    warn!(name = %thread_name, error = %e, "Frame loop initialization failed");
                    on_init_error(e);
                    return;
                }
            };

            while !stop.load(Ordering::SeqCst) {
                if loop_fn(&mut state) == LoopAction::Stop {
                    debug!(name = %thread_name, "Frame loop requested stop");
                    break;
                }
            }

            info!(name = %thread_name, "Frame loop exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take()
            && let Err(e) = handle.join()
        {
            warn!(name = %self.name, "Frame loop thread panicked: {:?}", e);
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = FrameLoopController::start("test-loop", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });
        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_signal_ends_loop() {
        let mut controller = FrameLoopController::start("test-loop", || {
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        });
        assert!(controller.is_running());
        controller.stop();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_init_failure_is_reported() {
        let (tx, rx) = mpsc::channel();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let mut controller = FrameLoopController::spawn(
            "test-fail-init",
            || Err::<(), _>("no such source".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
            move |e| {
                let _ = tx.send(e);
            },
        );
        controller.join();

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "no such source");
    }
}
