//! Rolling window of storage failures, consulted by the health layer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default observation window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Failures tolerated inside the window before the store reports degraded.
const DEFAULT_THRESHOLD: usize = 5;

/// Tracks recent storage failures in a rolling window.
///
/// Recording is best-effort, so individual failures are logged and dropped;
/// this window is how sustained trouble becomes visible. The store counts as
/// degraded once more than the threshold of failures land inside the window.
pub struct FailureWindow {
    window: Duration,
    threshold: usize,
    failures: Mutex<VecDeque<Instant>>,
}

impl Default for FailureWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl FailureWindow {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records one failure at the current instant.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut failures = self.lock();
        failures.push_back(now);
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > self.window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of failures currently inside the window.
    pub fn recent_failures(&self) -> usize {
        let now = Instant::now();
        let mut failures = self.lock();
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > self.window {
                failures.pop_front();
            } else {
                break;
            }
        }
        failures.len()
    }

    /// True when the failure rate exceeds the configured threshold.
    pub fn degraded(&self) -> bool {
        self.recent_failures() > self.threshold
    }
}
