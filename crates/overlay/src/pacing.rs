//! Timing rules for the worker loop: retry backoff, frame cadence, the
//! stall watchdog, and the fixed maintenance intervals.

use std::time::{Duration, Instant};

/// A worker that produces neither frames nor clean timeouts for this long
/// is stuck below the API surface; the engine exits instead of spinning.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Device-health poll cadence in presented frames.
pub const DEVICE_HEALTH_INTERVAL_FRAMES: u64 = 60;

/// Frames between the composition commit and the window reveal.
pub const REVEAL_DELAY_FRAMES: u32 = 1;

/// TOPMOST reassert cadence for visible overlays.
pub const TOPMOST_INTERVAL: Duration = Duration::from_millis(100);

/// Allow-list poll cadence, sliced so shutdown stays responsive.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const POLL_SLICE: Duration = Duration::from_millis(50);
pub const POLL_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Settle time after a power-resume forced reinit releases everything.
pub const FORCED_REINIT_DELAY: Duration = Duration::from_millis(500);

/// Settle time before the single recovery attempt after device removal.
pub const DEVICE_RECOVERY_DELAY: Duration = Duration::from_millis(2000);

/// Bound on the control-side stop wait before the worker is detached.
pub const STOP_WAIT_LIMIT: Duration = Duration::from_millis(2000);
pub const STOP_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Exponential capture-retry backoff: 50 ms doubling per consecutive
/// failure, capped at 5 s from the eighth failure on. Fast first retries
/// cover transient losses; the cap covers the secure desktop sitting open.
pub fn retry_backoff(consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.saturating_sub(1).min(7);
    Duration::from_millis((50u64 << exp).min(5000))
}

/// Failure log cadence: the first failure, then every tenth.
pub fn should_log_failure(consecutive_failures: u32) -> bool {
    consecutive_failures == 1 || consecutive_failures % 10 == 0
}

/// Acquire timeout from the output's display mode: one frame plus a 5 ms
/// margin, truncated to whole milliseconds. 20 ms when the rate is unknown.
pub fn frame_interval_ms(numerator: u32, denominator: u32) -> u32 {
    if numerator == 0 {
        return 20;
    }
    (1000.0 * f64::from(denominator) / f64::from(numerator) + 5.0) as u32
}

/// Tracks the last sign of life from the capture/present path. Frames and
/// clean timeouts both count; a static desktop is not a stall.
#[derive(Debug, Clone)]
pub struct Watchdog {
    last_activity: Instant,
    timeout: Duration,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::with_timeout(WATCHDOG_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            last_activity: Instant::now(),
            timeout,
        }
    }

    pub fn pet(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn expired(&self) -> bool {
        self.last_activity.elapsed() > self.timeout
    }

    pub fn stalled_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps_at_five_seconds() {
        let expected = [50u64, 100, 200, 400, 800, 1600, 3200, 5000, 5000, 5000];
        for (i, &ms) in expected.iter().enumerate() {
            assert_eq!(
                retry_backoff(i as u32 + 1),
                Duration::from_millis(ms),
                "failure #{}",
                i + 1
            );
        }
    }

    #[test]
    fn backoff_is_monotone_and_bounded() {
        let mut prev = Duration::ZERO;
        for failures in 1..100 {
            let b = retry_backoff(failures);
            assert!(b >= prev);
            assert!(b <= Duration::from_millis(5000));
            prev = b;
        }
    }

    #[test]
    fn failure_logging_is_throttled_to_every_tenth() {
        assert!(should_log_failure(1));
        assert!(!should_log_failure(2));
        assert!(!should_log_failure(9));
        assert!(should_log_failure(10));
        assert!(!should_log_failure(11));
        assert!(should_log_failure(30));
    }

    #[test]
    fn frame_interval_adds_margin_and_truncates() {
        // 60 Hz expressed both reduced and as DXGI reports it.
        assert_eq!(frame_interval_ms(60, 1), 21);
        assert_eq!(frame_interval_ms(60000, 1000), 21);
        assert_eq!(frame_interval_ms(144, 1), 11);
        assert_eq!(frame_interval_ms(30, 1), 38);
    }

    #[test]
    fn frame_interval_falls_back_when_rate_unknown() {
        assert_eq!(frame_interval_ms(0, 1), 20);
        assert_eq!(frame_interval_ms(0, 0), 20);
    }

    #[test]
    fn watchdog_expires_only_after_silence() {
        let mut dog = Watchdog::with_timeout(Duration::from_millis(20));
        assert!(!dog.expired());
        std::thread::sleep(Duration::from_millis(40));
        assert!(dog.expired());
        dog.pet();
        assert!(!dog.expired());
    }
}
