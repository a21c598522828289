//! A bucketed sliding window counter for approximating recent event counts.
//!
//! `Window` splits a trailing interval of `bucket_duration * bucket_count` into
//! a fixed ring of buckets. Events are added to the bucket at `head`, and as time
//! moves forward the head advances, expiring the oldest buckets and subtracting
//! their counts from a running sum.
//!
//! This gives:
//! - Bounded memory, fixed when the window is created
//! - O(1) totals (`total()`), no scan of the buckets
//! - Bounded work per update, no matter how long the window sat idle
//!
//! Counts may be off by up to one bucket near bucket boundaries, individual
//! event timestamps are never stored.
//!
//! ## Example
//! ```rust,ignore
//! let mut w = Window::new(Duration::from_secs(1), 60);
//! w.add(now, 1);
//! w.advance(now + chrono::Duration::seconds(30));
//! assert_eq!(w.total(), 1);
//! ```

use std::time::Duration;

use crate::Timestamp;

const DEFAULT_BUCKET_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct Window {
    buckets: Box<[u32]>,
    head: usize,
    //Aligned start of the bucket at `head`, in nanoseconds since the unix epoch
    last_bucket_time: Option<i64>,
    bucket_duration: i64,
    //Exact sum of `buckets`, wide enough that it never clamps
    sum: u64,
}

impl Window {
    /// Creates a new Window with `bucket_count` buckets of `bucket_duration` each.
    pub fn new(bucket_duration: Duration, bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let bucket_duration = if bucket_duration.is_zero() {
            DEFAULT_BUCKET_DURATION
        } else {
            bucket_duration
        };
        Window {
            buckets: vec![0u32; bucket_count].into_boxed_slice(),
            head: 0,
            last_bucket_time: None,
            bucket_duration: i64::try_from(bucket_duration.as_nanos()).unwrap_or(i64::MAX),
            sum: 0,
        }
    }

    /// Moves the head to the bucket aligned with `now`, zeroing every bucket that
    /// fell out of the window. Times before the current bucket are ignored.
    pub fn advance(&mut self, now: Timestamp) {
        let Some(nanos) = now.timestamp_nanos_opt() else {
            return;
        };
        let aligned = nanos.saturating_sub(nanos.rem_euclid(self.bucket_duration));

        let last = match self.last_bucket_time {
            Some(last) => last,
            None => {
                self.last_bucket_time = Some(aligned);
                self.head = 0;
                return;
            }
        };

        if aligned <= last {
            return;
        }

        let diff = (aligned.saturating_sub(last) / self.bucket_duration) as u64;
        let len = self.buckets.len();

        if diff >= len as u64 {
            self.buckets.fill(0);
            self.sum = 0;
            self.head = (self.head + (diff % len as u64) as usize) % len;
            self.last_bucket_time = Some(aligned);
            return;
        }

        for _ in 0..diff {
            self.head = (self.head + 1) % len;
            self.sum -= u64::from(self.buckets[self.head]);
            self.buckets[self.head] = 0;
        }

        self.last_bucket_time = Some(aligned);
    }

    /// Records `delta` events at `now`.
    #[inline]
    pub fn add(&mut self, now: Timestamp, delta: u32) {
        self.advance(now);
        let bucket = &mut self.buckets[self.head];
        let before = *bucket;
        *bucket = before.saturating_add(delta);
        self.sum += u64::from(*bucket - before);
    }

    /// Returns the approximate count over the window as of the last `advance`.
    #[inline]
    pub fn total(&self) -> u32 {
        u32::try_from(self.sum).unwrap_or(u32::MAX)
    }

    #[cfg(test)]
    fn bucket_sum(&self) -> u64 {
        self.buckets.iter().map(|b| u64::from(*b)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn base() -> Timestamp {
        Utc.timestamp_opt(1_699_920_000, 0).unwrap()
    }

    fn at_ms(ms: i64) -> Timestamp {
        base() + ChronoDuration::milliseconds(ms)
    }

    #[test]
    fn test_counts_within_window() {
        let mut w = Window::new(Duration::from_secs(1), 60);
        w.add(at_ms(0), 1);
        w.add(at_ms(200), 1);
        w.add(at_ms(1_500), 3);
        w.advance(at_ms(30_000));
        assert_eq!(w.total(), 5);
        assert_eq!(w.bucket_sum(), u64::from(w.total()));
    }

    #[test]
    fn test_expires_old_buckets_gradually() {
        let mut w = Window::new(Duration::from_secs(1), 10);
        w.add(at_ms(0), 2);
        w.add(at_ms(5_000), 3);

        w.advance(at_ms(9_999));
        assert_eq!(w.total(), 5);

        // bucket at t=0 leaves the window
        w.advance(at_ms(10_000));
        assert_eq!(w.total(), 3);
        assert_eq!(w.bucket_sum(), 3);

        w.advance(at_ms(15_000));
        assert_eq!(w.total(), 0);
        assert_eq!(w.bucket_sum(), 0);
    }

    #[test]
    fn test_full_rollover_after_long_idle() {
        let mut w = Window::new(Duration::from_millis(100), 5);
        w.add(at_ms(0), 4);
        w.add(at_ms(100), 4);
        w.advance(at_ms(3_600_000));
        assert_eq!(w.total(), 0);
        assert_eq!(w.bucket_sum(), 0);

        w.add(at_ms(3_600_050), 1);
        assert_eq!(w.total(), 1);
        assert_eq!(w.bucket_sum(), 1);
    }

    #[test]
    fn test_backward_time_is_noop() {
        let mut w = Window::new(Duration::from_secs(1), 10);
        w.add(at_ms(5_000), 2);
        w.advance(at_ms(1_000));
        assert_eq!(w.total(), 2);

        // late event lands in the current bucket
        w.add(at_ms(1_000), 1);
        assert_eq!(w.total(), 3);
        assert_eq!(w.bucket_sum(), 3);

        w.advance(at_ms(14_999));
        assert_eq!(w.total(), 3);
        w.advance(at_ms(15_000));
        assert_eq!(w.total(), 0);
    }

    #[test]
    fn test_running_sum_matches_buckets() {
        let mut w = Window::new(Duration::from_millis(250), 8);
        for i in 0..200i64 {
            w.add(at_ms(i * 137), (i % 3) as u32);
            assert_eq!(w.bucket_sum(), u64::from(w.total()));
        }
    }

    #[test]
    fn test_single_bucket_window() {
        let mut w = Window::new(Duration::from_secs(60), 1);
        w.add(at_ms(0), 1);
        w.add(at_ms(59_000), 1);
        assert_eq!(w.total(), 2);
        w.advance(at_ms(60_000));
        assert_eq!(w.total(), 0);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let mut w = Window::new(Duration::from_secs(1), 2);
        w.add(at_ms(0), u32::MAX);
        w.add(at_ms(10), 5);
        assert_eq!(w.total(), u32::MAX);
        w.advance(at_ms(2_000));
        assert_eq!(w.total(), 0);
    }

    #[test]
    fn test_saturated_bucket_expiry_keeps_later_counts() {
        let mut w = Window::new(Duration::from_secs(1), 3);
        w.add(at_ms(0), u32::MAX);
        w.add(at_ms(1_000), 5);
        assert_eq!(w.total(), u32::MAX);

        // only the saturated bucket leaves the window
        w.advance(at_ms(3_000));
        assert_eq!(w.total(), 5);
        assert_eq!(w.bucket_sum(), 5);
    }

    #[test]
    fn test_zero_parameters_fall_back() {
        let mut w = Window::new(Duration::ZERO, 0);
        w.add(at_ms(0), 1);
        assert_eq!(w.total(), 1);
        w.advance(at_ms(1_000));
        assert_eq!(w.total(), 0);
    }
}
