use std::collections::HashMap;
use std::sync::Arc;

use crate::call_spec::CallTypeSpec;
use crate::types::{CallType, WindowViolation};
use crate::window::Window;
use crate::Timestamp;

/// One call type's windows for a single caller, aligned 1:1 with
/// `spec.thresholds`.
#[derive(Debug)]
pub(crate) struct CallStats {
    spec: Arc<CallTypeSpec>,
    windows: Box<[Window]>,
}

impl CallStats {
    pub fn new(spec: Arc<CallTypeSpec>) -> Self {
        let windows = spec
            .thresholds
            .iter()
            .map(|th| Window::new(th.bucket_duration, th.bucket_count))
            .collect();
        Self { spec, windows }
    }

    #[inline]
    pub fn record(&mut self, now: Timestamp, delta: u32) {
        for w in self.windows.iter_mut() {
            w.add(now, delta);
        }
    }

    /// Advances every window to `now` and returns the thresholds that were reached.
    pub fn snapshot(&mut self, now: Timestamp) -> Vec<WindowViolation> {
        let mut violations = Vec::new();
        for (w, th) in self.windows.iter_mut().zip(self.spec.thresholds.iter()) {
            w.advance(now);
            let total = w.total();
            let limit = th.threshold.count;
            if limit > 0 && total >= limit {
                violations.push(WindowViolation {
                    window: th.threshold.window,
                    count: total,
                    limit,
                });
            }
        }
        violations
    }
}

/// Everything tracked for one caller.
#[derive(Debug)]
pub(crate) struct UserStats {
    pub per_type: HashMap<CallType, CallStats, ahash::RandomState>,
    pub last_seen: Timestamp,
}

impl UserStats {
    pub fn new(now: Timestamp) -> Self {
        Self {
            per_type: HashMap::default(),
            last_seen: now,
        }
    }

    /// Records `delta` calls of `call_type`. `call_type` is the key its `CallTypeSpec`
    /// was registered under, so inserting it only bumps a refcount.
    pub fn record(
        &mut self,
        now: Timestamp,
        call_type: &CallType,
        spec: &Arc<CallTypeSpec>,
        delta: u32,
    ) {
        if let Some(stats) = self.per_type.get_mut(call_type) {
            stats.record(now, delta);
        } else {
            let mut stats = CallStats::new(spec.clone());
            stats.record(now, delta);
            self.per_type.insert(call_type.clone(), stats);
        }
        self.last_seen = now;
    }
}
