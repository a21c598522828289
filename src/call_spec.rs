use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{CallType, Threshold};

pub(crate) type CallSpecs = HashMap<CallType, Arc<CallTypeSpec>, ahash::RandomState>;

const TARGET_BUCKETS_PER_WINDOW: u32 = 60;
const MAX_BUCKETS_PER_WINDOW: usize = 1024;
const MIN_BUCKET_DURATION: Duration = Duration::from_millis(100);

/// Bucket layout for one configured threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThresholdSpec {
    pub threshold: Threshold,
    pub bucket_duration: Duration,
    pub bucket_count: usize,
}

/// Immutable per call type plan: one `ThresholdSpec` per valid threshold, in
/// configured order. Windows built from it are indexed in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallTypeSpec {
    pub thresholds: Vec<ThresholdSpec>,
}

impl CallTypeSpec {
    /// Returns `None` when no threshold survives validation.
    pub fn build(thresholds: &[Threshold]) -> Option<Self> {
        let thresholds = thresholds
            .iter()
            .filter(|th| th.is_valid())
            .map(|th| {
                let (bucket_duration, bucket_count) = compute_window_buckets(th.window);
                ThresholdSpec {
                    threshold: *th,
                    bucket_duration,
                    bucket_count,
                }
            })
            .collect::<Vec<_>>();
        if thresholds.is_empty() {
            None
        } else {
            Some(Self { thresholds })
        }
    }

    #[inline]
    pub fn max_window(&self) -> Duration {
        self.thresholds
            .iter()
            .map(|th| th.threshold.window)
            .max()
            .unwrap_or_default()
    }
}

/// Builds specs for every configured call type and returns them with the
/// longest configured window (zero if nothing is tracked).
pub(crate) fn build_call_specs(
    thresholds: &HashMap<CallType, Vec<Threshold>>,
) -> (CallSpecs, Duration) {
    let mut specs = CallSpecs::default();
    let mut max_window = Duration::ZERO;
    for (call_type, values) in thresholds {
        let Some(spec) = CallTypeSpec::build(values) else {
            continue;
        };
        max_window = max_window.max(spec.max_window());
        specs.insert(call_type.clone(), Arc::new(spec));
    }
    (specs, max_window)
}

/// Picks a bucket duration and count for `window`: about 60 buckets, no bucket
/// shorter than 100ms, and never more than 1024 buckets.
pub(crate) fn compute_window_buckets(window: Duration) -> (Duration, usize) {
    if window.is_zero() {
        return (Duration::from_secs(1), 1);
    }

    let mut bucket = (window / TARGET_BUCKETS_PER_WINDOW).max(MIN_BUCKET_DURATION);
    let mut count = bucket_count(window, bucket);
    while count > MAX_BUCKETS_PER_WINDOW {
        bucket = bucket.saturating_mul(2);
        if bucket >= window {
            return (window, 1);
        }
        count = bucket_count(window, bucket);
    }
    (bucket, count)
}

#[inline]
fn bucket_count(window: Duration, bucket: Duration) -> usize {
    if bucket.is_zero() {
        return 1;
    }
    let n = window.as_nanos() / bucket.as_nanos();
    usize::try_from(n).unwrap_or(usize::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_window_uses_second_buckets() {
        assert_eq!(
            compute_window_buckets(Duration::from_secs(60)),
            (Duration::from_secs(1), 60)
        );
    }

    #[test]
    fn test_daily_window() {
        let (bucket, count) = compute_window_buckets(Duration::from_secs(24 * 3600));
        assert_eq!(bucket, Duration::from_secs(1440));
        assert_eq!(count, 60);
    }

    #[test]
    fn test_short_window_floors_bucket_duration() {
        assert_eq!(
            compute_window_buckets(Duration::from_secs(1)),
            (Duration::from_millis(100), 10)
        );
        // shorter than a single minimum bucket
        assert_eq!(
            compute_window_buckets(Duration::from_millis(50)),
            (Duration::from_millis(100), 1)
        );
    }

    #[test]
    fn test_bucket_count_never_exceeds_cap() {
        for secs in [1u64, 7, 59, 61, 3600, 86_400, 30 * 86_400] {
            let window = Duration::from_secs(secs);
            let (bucket, count) = compute_window_buckets(window);
            assert!(count >= 1 && count <= MAX_BUCKETS_PER_WINDOW);
            assert!(bucket >= MIN_BUCKET_DURATION || bucket == window);
        }
    }

    #[test]
    fn test_build_drops_invalid_thresholds() {
        let spec = CallTypeSpec::build(&[
            Threshold::new(Duration::ZERO, 5),
            Threshold::new(Duration::from_secs(60), 0),
            Threshold::new(Duration::from_secs(60), 50),
        ])
        .unwrap();
        assert_eq!(spec.thresholds.len(), 1);
        assert_eq!(spec.thresholds[0].threshold.count, 50);

        assert!(CallTypeSpec::build(&[Threshold::new(Duration::ZERO, 5)]).is_none());
        assert!(CallTypeSpec::build(&[]).is_none());
    }

    #[test]
    fn test_build_keeps_configured_order() {
        let spec = CallTypeSpec::build(&[
            Threshold::new(Duration::from_secs(1800), 1000),
            Threshold::new(Duration::from_secs(60), 50),
        ])
        .unwrap();
        let windows = spec
            .thresholds
            .iter()
            .map(|th| th.threshold.window)
            .collect::<Vec<_>>();
        assert_eq!(
            windows,
            vec![Duration::from_secs(1800), Duration::from_secs(60)]
        );
        assert_eq!(spec.max_window(), Duration::from_secs(1800));
    }

    #[test]
    fn test_build_call_specs_skips_untracked() {
        let mut thresholds = HashMap::new();
        thresholds.insert(
            CallType::from_static("event"),
            vec![
                Threshold::new(Duration::from_secs(60), 50),
                Threshold::new(Duration::from_secs(1800), 1000),
            ],
        );
        thresholds.insert(
            CallType::from_static("media_event"),
            vec![Threshold::new(Duration::from_secs(7200), 0)],
        );
        thresholds.insert(CallType::from_static("other"), vec![]);

        let (specs, max_window) = build_call_specs(&thresholds);
        assert_eq!(specs.len(), 1);
        assert!(specs.contains_key("event"));
        assert!(!specs.contains_key("media_event"));
        assert_eq!(max_window, Duration::from_secs(1800));
    }

    #[test]
    fn test_build_call_specs_empty() {
        let (specs, max_window) = build_call_specs(&HashMap::new());
        assert!(specs.is_empty());
        assert_eq!(max_window, Duration::ZERO);
    }
}
