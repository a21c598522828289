use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use duration_str::deserialize_duration;
use log::info;
use serde::{Deserialize, Serialize};

pub use crate::address::{Address, ADDRESS_LENGTH};
pub use crate::error::{Error, Result};
pub use crate::monitor::{CallRateMonitor, InMemoryCallRateMonitor, NoopCallRateMonitor};
pub use crate::types::{
    AbuserInfo, CallType, Threshold, WindowViolation, CALL_TYPE_CREATE_MEDIA_STREAM,
    CALL_TYPE_EVENT, CALL_TYPE_MEDIA_EVENT,
};

use crate::monitor::{DEFAULT_CLEANUP_MIN_INTERVAL, DEFAULT_CLEANUP_WATERMARK, DEFAULT_MAX_RESULTS};
use crate::types::serialize_duration;

mod address;
mod call_spec;
mod error;
mod monitor;
mod stats;
mod types;
mod window;

pub type Timestamp = chrono::DateTime<chrono::Utc>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    //Off selects the no-op monitor
    pub enabled: bool,
    //Cap on entries returned by get_abuser_info, 0 means the default of 50
    pub max_results: usize,
    //Thresholds per call type, in evaluation order
    pub thresholds: HashMap<CallType, Vec<Threshold>>,
    //Caller count above which record_call sweeps idle callers
    pub cleanup_watermark: usize,
    //Minimum time between two sweeps triggered by record_call
    #[serde(deserialize_with = "deserialize_duration")]
    #[serde(serialize_with = "serialize_duration")]
    pub cleanup_min_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        let half_hour = Duration::from_secs(30 * 60);
        let mut thresholds = HashMap::new();
        thresholds.insert(
            CallType::from_static(CALL_TYPE_EVENT),
            vec![
                Threshold::new(minute, 50),
                Threshold::new(half_hour, 1000),
            ],
        );
        thresholds.insert(
            CallType::from_static(CALL_TYPE_MEDIA_EVENT),
            vec![Threshold::new(minute, 50), Threshold::new(half_hour, 500)],
        );
        thresholds.insert(
            CallType::from_static(CALL_TYPE_CREATE_MEDIA_STREAM),
            vec![Threshold::new(minute, 5), Threshold::new(half_hour, 100)],
        );
        Self {
            enabled: true,
            max_results: DEFAULT_MAX_RESULTS,
            thresholds,
            cleanup_watermark: DEFAULT_CLEANUP_WATERMARK,
            cleanup_min_interval: DEFAULT_CLEANUP_MIN_INTERVAL,
        }
    }
}

impl Config {
    /// Parses a JSON document. Missing fields take their default values.
    pub fn from_json(s: &str) -> Result<Config> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Builds the monitor selected by `cfg.enabled`.
pub fn new_call_rate_monitor(cfg: Config) -> Arc<dyn CallRateMonitor> {
    if !cfg.enabled {
        info!("call rate monitor disabled");
        return Arc::new(NoopCallRateMonitor);
    }
    Arc::new(InMemoryCallRateMonitor::new(&cfg))
}
