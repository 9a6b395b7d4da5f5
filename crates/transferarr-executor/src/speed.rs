//! Sliding-window transfer-speed estimation for `progress_view.transfer_speed`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bytes/second over a trailing ~2s window, computed from
/// timestamped byte-count samples rather than a single instantaneous
/// delta so a momentary stall doesn't read as zero throughput.
pub struct SpeedTracker {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedTracker {
    /// Creates a tracker with the default two-second window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(2))
    }

    /// Creates a tracker with a caller-chosen window, mainly for tests.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records that `total_bytes_done` have now been transferred in total,
    /// and returns the current estimated bytes/second.
    pub fn sample(&mut self, now: Instant, total_bytes_done: u64) -> f64 {
        self.samples.push_back((now, total_bytes_done));
        while let Some(&(oldest, _)) = self.samples.front() {
            if now.duration_since(oldest) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let Some(&(oldest_time, oldest_bytes)) = self.samples.front() else {
            return 0.0;
        };
        let elapsed = now.duration_since(oldest_time).as_secs_f64();
        if elapsed <= 0.0 || total_bytes_done < oldest_bytes {
            return 0.0;
        }
        (total_bytes_done - oldest_bytes) as f64 / elapsed
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_reports_zero_speed() {
        let mut tracker = SpeedTracker::new();
        assert_eq!(tracker.sample(Instant::now(), 1024), 0.0);
    }

    #[test]
    fn two_samples_one_second_apart_report_their_delta() {
        let mut tracker = SpeedTracker::with_window(Duration::from_secs(2));
        let start = Instant::now();
        tracker.sample(start, 0);
        let speed = tracker.sample(start + Duration::from_secs(1), 1_000_000);
        assert!((speed - 1_000_000.0).abs() < 1.0);
    }

    #[test]
    fn samples_older_than_the_window_are_dropped() {
        let mut tracker = SpeedTracker::with_window(Duration::from_secs(2));
        let start = Instant::now();
        tracker.sample(start, 0);
        tracker.sample(start + Duration::from_secs(1), 1_000_000);
        // Third sample is >2s after the first; the first should have aged out,
        // leaving only the second sample (1s, 1_000_000 bytes) in the window.
        let speed = tracker.sample(start + Duration::from_secs(3), 3_000_000);
        assert!((speed - 1_000_000.0).abs() < 1.0);
    }
}
