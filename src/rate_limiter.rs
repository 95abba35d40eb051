//! Sliding-window rate limiter for the HubSpot API
//!
//! HubSpot enforces a burst limit of 110 requests per rolling 10-second
//! window per token. This module implements sliding-window admission
//! control that:
//! - Records the timestamp of every admitted request
//! - Prunes timestamps older than the window before each decision
//! - Blocks a caller until the oldest in-window request ages out
//! - Shares one window across every clone, so all request paths obey a
//!   single global budget

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default admission budget: 110 requests per rolling 10 seconds.
pub const DEFAULT_MAX_REQUESTS: usize = 110;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Sliding-window rate limiter
///
/// Admission is gated on the timestamps of previously admitted requests:
/// a call is admitted as soon as fewer than `max_requests` admissions are
/// younger than `window`. Waits are computed exactly as the time until the
/// oldest in-window admission expires, so a burst that fills the window
/// drains at the API's pace with no extra smoothing.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    inner: Arc<Mutex<WindowState>>,
}

#[derive(Debug)]
struct WindowState {
    /// Timestamps of admitted requests, oldest first
    timestamps: VecDeque<Instant>,
    /// Maximum admissions per rolling window
    max_requests: usize,
    /// Rolling window duration
    window: Duration,
    /// Total admissions since creation (for stats)
    total_admitted: u64,
    /// Total time spent waiting for the window to open (for stats)
    total_waited: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the HubSpot default budget (110 per 10s)
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Create a limiter with a custom budget
    ///
    /// # Arguments
    /// * `max_requests` - Admissions allowed per rolling window
    /// * `window` - Rolling window duration
    pub fn with_config(max_requests: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WindowState {
                timestamps: VecDeque::with_capacity(max_requests),
                max_requests,
                window,
                total_admitted: 0,
                total_waited: Duration::ZERO,
            })),
        }
    }

    /// Admit one request, waiting until it fits in the window
    ///
    /// Evicts expired timestamps, then, if the window is at capacity,
    /// sleeps for exactly `oldest + window - now` before recording the
    /// admission. The window lock is held across the sleep, so concurrent
    /// admits serialize and each incurs its own correctly computed wait.
    /// There is no cancellation; the call always returns admitted.
    pub async fn admit(&self) {
        let mut state = self.inner.lock().await;

        let now = Instant::now();
        while let Some(oldest) = state.timestamps.front() {
            if now.duration_since(*oldest) > state.window {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }

        trace!(
            "Rate window: {}/{} admissions in the last {:?}",
            state.timestamps.len(),
            state.max_requests,
            state.window
        );

        if state.timestamps.len() >= state.max_requests {
            if let Some(oldest) = state.timestamps.front().copied() {
                let wait = (oldest + state.window).saturating_duration_since(now);
                if !wait.is_zero() {
                    debug!(
                        "Rate window full ({} requests), waiting {:.2}s",
                        state.max_requests,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    state.total_waited += wait;
                }
            }
        }

        state.timestamps.push_back(Instant::now());
        // The admission that just waited displaces the expired oldest entry;
        // the window never holds more than max_requests timestamps.
        while state.timestamps.len() > state.max_requests {
            state.timestamps.pop_front();
        }
        state.total_admitted += 1;
    }

    /// Get current statistics about window usage
    pub async fn stats(&self) -> WindowStats {
        let mut state = self.inner.lock().await;

        // Prune so in_window reflects the current instant
        let now = Instant::now();
        while let Some(oldest) = state.timestamps.front() {
            if now.duration_since(*oldest) > state.window {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }

        WindowStats {
            in_window: state.timestamps.len(),
            max_requests: state.max_requests,
            total_admitted: state.total_admitted,
            total_waited: state.total_waited,
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SlidingWindowLimiter {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Statistics about window usage
#[derive(Debug, Clone)]
pub struct WindowStats {
    /// Admissions currently inside the rolling window
    pub in_window: usize,
    /// Maximum admissions per rolling window
    pub max_requests: usize,
    /// Total admissions since creation
    pub total_admitted: u64,
    /// Total time spent blocked waiting for the window
    pub total_waited: Duration,
}
