use std::time::Duration;

use bytestring::ByteString;
use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize, Serializer};

use crate::address::Address;
use crate::Timestamp;

/// Identifies the kind of RPC operation being tracked. Categories are open:
/// any string works, the constants below are the ones the node ships with.
pub type CallType = ByteString;

pub const CALL_TYPE_EVENT: &str = "event";
pub const CALL_TYPE_MEDIA_EVENT: &str = "media_event";
pub const CALL_TYPE_CREATE_MEDIA_STREAM: &str = "create_media_stream";

/// A maximum count per time window.
///
/// A threshold with a zero window or a zero count is inert and is dropped when
/// the monitor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(deserialize_with = "deserialize_duration")]
    #[serde(serialize_with = "serialize_duration")]
    pub window: Duration,
    pub count: u32,
}

impl Threshold {
    #[inline]
    pub const fn new(window: Duration, count: u32) -> Self {
        Self { window, count }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.window.is_zero() && self.count > 0
    }
}

/// The observed count for one threshold that reached its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowViolation {
    #[serde(serialize_with = "serialize_duration")]
    pub window: Duration,
    pub count: u32,
    pub limit: u32,
}

impl WindowViolation {
    #[inline]
    pub fn severity(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.count as f64 / self.limit as f64
    }
}

/// A single offending caller for a specific call type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbuserInfo {
    pub user: Address,
    pub call_type: CallType,
    pub violations: Vec<WindowViolation>,
    pub last_seen: Timestamp,
}

impl AbuserInfo {
    /// Highest `count / limit` ratio across all violations.
    #[inline]
    pub fn severity(&self) -> f64 {
        self.violations
            .iter()
            .map(WindowViolation::severity)
            .fold(0.0, f64::max)
    }
}

// Writes durations in a form `duration_str` reads back, e.g. "30m", "90s", "250ms".
pub(crate) fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let duration_str = if duration.subsec_nanos() != 0 {
        format!("{}ms", duration.as_millis())
    } else {
        let secs = duration.as_secs();
        if secs > 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs > 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        }
    };
    serializer.serialize_str(&duration_str)
}
