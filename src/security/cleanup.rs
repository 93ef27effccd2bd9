use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::security::{RateLimiter, SecurityError};

// Upper bound on how long stop() waits for the worker to notice
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Background sweep of stale rate-limit entries.
///
/// The worker thread stops when `stop()` is called or the task is dropped.
pub struct CleanupTask {
    interval: Duration,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Result<Self, SecurityError> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("rate-limit-cleanup".to_string())
            .spawn(move || {
                while sleep_unless_stopped(&worker_stop, interval) {
                    match limiter.cleanup() {
                        Ok(removed) => debug!("Scheduled cleanup removed {} entries", removed),
                        Err(e) => warn!("Scheduled rate limit cleanup failed: {}", e),
                    }
                }
                debug!("Rate limit cleanup task stopped");
            })?;

        Ok(Self {
            interval,
            stop,
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal the worker and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Block the caller while the sweep keeps running
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Rate limit cleanup thread panicked");
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Rate limit cleanup thread panicked");
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleep for `interval`, returning false early if a stop was requested
fn sleep_unless_stopped(stop: &AtomicBool, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(POLL_SLICE.min(deadline - now));
    }
}
