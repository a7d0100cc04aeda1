use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::features::{ConfigError, ExtractorKind};

/// Default absolute flow lifetime, in microseconds.
pub const DEFAULT_FLOW_TIMEOUT_US: i64 = 5_000_000;
/// Default inactivity gap that closes a flow, in microseconds.
pub const DEFAULT_ACTIVITY_TIMEOUT_US: i64 = 3_000_000;
/// Label given to flows no attack rule matches.
pub const DEFAULT_LABEL: &str = "NormalTraffic";

/// Whether the two directions of an exchange share one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDirection {
    #[default]
    Bidirectional,
    Unidirectional,
}

impl fmt::Display for SessionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionDirection::Bidirectional => f.write_str("bidirectional"),
            SessionDirection::Unidirectional => f.write_str("unidirectional"),
        }
    }
}

impl FromStr for SessionDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bidirectional" => Ok(SessionDirection::Bidirectional),
            "unidirectional" => Ok(SessionDirection::Unidirectional),
            other => Err(format!("unknown session direction '{other}'")),
        }
    }
}

/// Flow timeout thresholds, in microseconds.
///
/// Only the absolute cap is enforced unless `track_activity` is set, in which
/// case a gap longer than `activity_timeout_us` since the previous packet
/// also closes the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTimeouts {
    /// Maximum distance between a flow's first packet and any later packet.
    pub flow_timeout_us: i64,
    /// Maximum gap between consecutive packets.
    pub activity_timeout_us: i64,
    pub track_activity: bool,
}

impl FlowTimeouts {
    /// Thresholds with the inactivity check switched on.
    pub fn with_activity(flow_timeout_us: i64, activity_timeout_us: i64) -> Self {
        Self {
            flow_timeout_us,
            activity_timeout_us,
            track_activity: true,
        }
    }
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self {
            flow_timeout_us: DEFAULT_FLOW_TIMEOUT_US,
            activity_timeout_us: DEFAULT_ACTIVITY_TIMEOUT_US,
            track_activity: false,
        }
    }
}

/// Run-wide settings for one pass over a packet sequence.
///
/// # Examples
/// ```
/// use flowmeter_core::{MeterConfig, SessionDirection};
///
/// let config = MeterConfig::default();
/// assert_eq!(config.direction, SessionDirection::Bidirectional);
/// assert_eq!(config.timeouts.flow_timeout_us, 5_000_000);
/// assert_eq!(config.default_label, "NormalTraffic");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub direction: SessionDirection,
    pub timeouts: FlowTimeouts,
    pub default_label: String,
    /// Offset from UTC, in seconds, for readable timestamps and label
    /// windows. Captures are labelled in the wall-clock time they were taken.
    pub utc_offset_secs: i32,
    /// Built-in extractors in registration order.
    pub extractors: Vec<ExtractorKind>,
}

impl MeterConfig {
    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        UtcOffset::from_whole_seconds(self.utc_offset_secs)
            .map_err(|_| ConfigError::UtcOffset(self.utc_offset_secs))
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            direction: SessionDirection::default(),
            timeouts: FlowTimeouts::default(),
            default_label: DEFAULT_LABEL.to_string(),
            utc_offset_secs: 0,
            extractors: ExtractorKind::ALL.to_vec(),
        }
    }
}
