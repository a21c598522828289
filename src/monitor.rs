use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::address::Address;
use crate::call_spec::{build_call_specs, CallSpecs};
use crate::stats::UserStats;
use crate::types::AbuserInfo;
use crate::{Config, Timestamp};

pub(crate) const DEFAULT_CLEANUP_AGE: Duration = Duration::from_secs(3600);
pub(crate) const DEFAULT_MAX_RESULTS: usize = 50;
pub(crate) const DEFAULT_CLEANUP_WATERMARK: usize = 4096;
pub(crate) const DEFAULT_CLEANUP_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Tracks per caller call rates across call types and reports the callers that
/// crossed a configured threshold.
///
/// Neither operation fails. Bad input (zero callers, untracked call types,
/// timestamps moving backwards) is ignored rather than rejected.
pub trait CallRateMonitor: Send + Sync {
    /// Records one call of `call_type` made by `user` at `now`.
    fn record_call(&self, user: &[u8], now: Timestamp, call_type: &str);

    /// Returns the current offenders ordered by severity, or `None` when no
    /// tracked caller is over any threshold. A `Some` list is never empty.
    fn get_abuser_info(&self, now: Timestamp) -> Option<Vec<AbuserInfo>>;
}

/// Used when tracking is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallRateMonitor;

impl CallRateMonitor for NoopCallRateMonitor {
    #[inline]
    fn record_call(&self, _user: &[u8], _now: Timestamp, _call_type: &str) {}

    #[inline]
    fn get_abuser_info(&self, _now: Timestamp) -> Option<Vec<AbuserInfo>> {
        None
    }
}

struct Inner {
    users: HashMap<Address, UserStats, ahash::RandomState>,
    last_cleanup: Option<Timestamp>,
}

/// Keeps per caller counters for each call type under a single lock.
///
/// `record_call` looks up the precomputed spec for the call type, advances each
/// of the caller's windows to `now` and bumps the current bucket. Idle callers
/// are evicted once the caller count crosses the cleanup watermark.
pub struct InMemoryCallRateMonitor {
    inner: Mutex<Inner>,
    call_specs: CallSpecs,
    cleanup_after: Duration,
    max_results: usize,
    cleanup_watermark: usize,
    cleanup_min_interval: Duration,
}

impl InMemoryCallRateMonitor {
    pub fn new(cfg: &Config) -> Self {
        let (call_specs, max_window) = build_call_specs(&cfg.thresholds);
        let cleanup_after = if max_window.is_zero() {
            DEFAULT_CLEANUP_AGE
        } else {
            max_window
        };
        let max_results = if cfg.max_results == 0 {
            DEFAULT_MAX_RESULTS
        } else {
            cfg.max_results
        };

        let mut call_types = call_specs
            .keys()
            .map(|ct| ct.to_string())
            .collect::<Vec<_>>();
        call_types.sort();
        info!(
            "call rate monitor initialized, cleanup_after: {:?}, max_results: {}, call_types: {:?}",
            cleanup_after, max_results, call_types
        );

        Self {
            inner: Mutex::new(Inner {
                users: HashMap::default(),
                last_cleanup: None,
            }),
            call_specs,
            cleanup_after,
            max_results,
            cleanup_watermark: cfg.cleanup_watermark,
            cleanup_min_interval: cfg.cleanup_min_interval,
        }
    }

    /// How long an idle caller is kept before cleanup may evict it.
    #[inline]
    pub fn cleanup_after(&self) -> Duration {
        self.cleanup_after
    }

    /// Number of callers currently holding state.
    #[inline]
    pub fn tracked_users(&self) -> usize {
        self.inner.lock().users.len()
    }

    /// Evicts every caller idle for longer than `cleanup_after`, returning how
    /// many were removed.
    pub fn cleanup(&self, now: Timestamp) -> usize {
        let mut inner = self.inner.lock();
        self.cleanup_locked(&mut inner, now)
    }

    fn cleanup_locked(&self, inner: &mut Inner, now: Timestamp) -> usize {
        let before = inner.users.len();
        // a retention reaching past the representable range keeps everyone
        if let Some(expire_before) = chrono::Duration::from_std(self.cleanup_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        {
            inner.users.retain(|_, s| s.last_seen >= expire_before);
        }
        inner.last_cleanup = Some(now);
        let evicted = before - inner.users.len();
        debug!(
            "call rate monitor cleanup, evicted: {}, remaining: {}",
            evicted,
            inner.users.len()
        );
        evicted
    }

    #[inline]
    fn should_cleanup(&self, inner: &Inner, now: Timestamp) -> bool {
        if inner.users.len() <= self.cleanup_watermark {
            return false;
        }
        match inner.last_cleanup {
            None => true,
            // a clock behind the last sweep sweeps again, which also rewinds `last_cleanup`
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.cleanup_min_interval,
                Err(_) => true,
            },
        }
    }
}

impl CallRateMonitor for InMemoryCallRateMonitor {
    fn record_call(&self, user: &[u8], now: Timestamp, call_type: &str) {
        if user.is_empty() {
            return;
        }
        let user = Address::from_slice(user);
        if user.is_zero() {
            return;
        }
        let Some((call_type, spec)) = self.call_specs.get_key_value(call_type) else {
            return;
        };

        let mut inner = self.inner.lock();
        inner
            .users
            .entry(user)
            .or_insert_with(|| UserStats::new(now))
            .record(now, call_type, spec, 1);

        if self.should_cleanup(&inner, now) {
            self.cleanup_locked(&mut inner, now);
        }
    }

    fn get_abuser_info(&self, now: Timestamp) -> Option<Vec<AbuserInfo>> {
        let mut inner = self.inner.lock();

        let mut result = Vec::new();
        for (addr, stats) in inner.users.iter_mut() {
            let last_seen = stats.last_seen;
            for (call_type, cs) in stats.per_type.iter_mut() {
                let violations = cs.snapshot(now);
                if violations.is_empty() {
                    continue;
                }
                for v in violations.iter() {
                    warn!(
                        "call rate threshold exceeded, addr: {}, call_type: {}, window: {:?}, count: {}, threshold: {}",
                        addr, call_type, v.window, v.count, v.limit
                    );
                }
                result.push(AbuserInfo {
                    user: *addr,
                    call_type: call_type.clone(),
                    violations,
                    last_seen,
                });
            }
        }
        drop(inner);

        if result.is_empty() {
            return None;
        }

        let mut ranked = result
            .into_iter()
            .map(|info| (info.severity(), info))
            .collect::<Vec<_>>();
        ranked.sort_by(|(sev_a, a), (sev_b, b)| rank(*sev_a, a, *sev_b, b));
        ranked.truncate(self.max_results);

        Some(ranked.into_iter().map(|(_, info)| info).collect())
    }
}

// Severity descending, then most recently seen, then caller and call type.
#[inline]
fn rank(sev_a: f64, a: &AbuserInfo, sev_b: f64, b: &AbuserInfo) -> Ordering {
    sev_b
        .total_cmp(&sev_a)
        .then_with(|| b.last_seen.cmp(&a.last_seen))
        .then_with(|| a.user.cmp(&b.user))
        .then_with(|| a.call_type.cmp(&b.call_type))
}
