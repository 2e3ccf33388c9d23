//! Sliding-window accounting for the outbound request rate.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Tracks dispatch timestamps over the trailing minute and answers how long
/// the worker must wait so the next dispatch stays within both limits.
///
/// Owned exclusively by the dispatch worker; entries older than the minute
/// window are pruned lazily on each query.
#[derive(Debug)]
pub struct RequestWindow {
    max_per_second: usize,
    max_per_minute: usize,
    sent: VecDeque<Instant>,
}

impl RequestWindow {
    /// Create a window enforcing both limits. A limit of zero disables that
    /// bound.
    #[must_use]
    pub fn new(max_per_second: usize, max_per_minute: usize) -> Self {
        Self {
            max_per_second,
            max_per_minute,
            sent: VecDeque::with_capacity(max_per_minute.max(max_per_second)),
        }
    }

    /// Record a dispatch at `now`.
    pub fn record(&mut self, now: Instant) {
        self.sent.push_back(now);
    }

    /// Minimum wait so that dispatching afterwards would not push the
    /// trailing one-second count above the per-second limit nor the trailing
    /// sixty-second count above the per-minute limit. Zero when clear.
    ///
    /// The answer is only valid for the instant it was computed; callers
    /// must re-evaluate after sleeping.
    pub fn required_delay(&mut self, now: Instant) -> Duration {
        self.prune(now);

        let mut delay = Duration::ZERO;

        // The blocking timestamp for an N-per-window limit is the Nth most
        // recent dispatch: a new dispatch is clear once that one has aged
        // out of the window.
        if self.max_per_second > 0 && self.sent.len() >= self.max_per_second {
            if let Some(&blocking) = self.sent.get(self.sent.len() - self.max_per_second) {
                delay = delay.max((blocking + SECOND).duration_since(now));
            }
        }

        if self.max_per_minute > 0 && self.sent.len() >= self.max_per_minute {
            if let Some(&blocking) = self.sent.get(self.sent.len() - self.max_per_minute) {
                delay = delay.max((blocking + MINUTE).duration_since(now));
            }
        }

        delay
    }

    /// Drop timestamps that left the minute window.
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.sent.front() {
            if now.duration_since(front) >= MINUTE {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_no_delay() {
        let mut window = RequestWindow::new(3, 60);
        assert_eq!(window.required_delay(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_per_second_limit_blocks_fourth_request() {
        let mut window = RequestWindow::new(3, 60);
        let base = Instant::now();

        window.record(base);
        window.record(base);
        window.record(base);

        // All three landed at `base`, so the next slot opens exactly one
        // second later.
        assert_eq!(window.required_delay(base), SECOND);
        assert_eq!(
            window.required_delay(base + Duration::from_millis(400)),
            Duration::from_millis(600)
        );
        assert_eq!(window.required_delay(base + SECOND), Duration::ZERO);
    }

    #[test]
    fn test_spaced_requests_do_not_block() {
        let mut window = RequestWindow::new(2, 60);
        let base = Instant::now();

        window.record(base);
        window.record(base + Duration::from_millis(600));
        // The first entry ages out of the one-second window at base+1s.
        assert_eq!(
            window.required_delay(base + Duration::from_millis(900)),
            Duration::from_millis(100)
        );
        assert_eq!(window.required_delay(base + Duration::from_millis(1100)), Duration::ZERO);
    }

    #[test]
    fn test_per_minute_limit_applies() {
        let mut window = RequestWindow::new(0, 5);
        let base = Instant::now();

        for i in 0..5 {
            window.record(base + Duration::from_secs(i));
        }

        // Five in the trailing minute: the next slot opens when the oldest
        // entry leaves the sixty-second window.
        assert_eq!(window.required_delay(base + Duration::from_secs(10)), Duration::from_secs(50));
        assert_eq!(window.required_delay(base + Duration::from_secs(60)), Duration::ZERO);
    }

    #[test]
    fn test_both_limits_take_the_larger_delay() {
        let mut window = RequestWindow::new(1, 2);
        let base = Instant::now();

        window.record(base);
        window.record(base + Duration::from_millis(100));

        // Per-second says wait until base+1.1s, per-minute says until base+60s.
        assert_eq!(
            window.required_delay(base + Duration::from_millis(200)),
            Duration::from_millis(59_800)
        );
    }

    #[test]
    fn test_old_entries_are_pruned() {
        let mut window = RequestWindow::new(0, 2);
        let base = Instant::now();

        window.record(base);
        window.record(base + Duration::from_secs(1));

        // After both have aged out, the window is clear again.
        assert_eq!(window.required_delay(base + Duration::from_secs(61)), Duration::ZERO);
        assert_eq!(window.sent.len(), 0);
    }

    #[test]
    fn test_zero_limits_disable_bounds() {
        let mut window = RequestWindow::new(0, 0);
        let base = Instant::now();
        for _ in 0..100 {
            window.record(base);
        }
        assert_eq!(window.required_delay(base), Duration::ZERO);
    }
}
