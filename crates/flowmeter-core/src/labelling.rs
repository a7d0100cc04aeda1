//! Ground-truth labels from attack records.
//!
//! Attack records name a protocol, two endpoints, port pairs and a
//! time-of-day window. They compile into session patterns matched against a
//! flow's space-joined 5-tuple; each pattern owns the windows registered
//! under it. Only the time of day is compared, so a window matches on every
//! calendar day of a capture.

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Time;
use time::macros::{format_description, time};
use tracing::warn;

use crate::analysis::session::SessionKeyInfo;
use crate::config::SessionDirection;

/// Open end of a labelling window.
pub const INFINITY: &str = "infinity";
const END_OF_DAY: Time = time!(23:59:59.999_999);

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("invalid time of day '{value}' in attack record '{label}'")]
    Time { value: String, label: String },
    #[error("invalid session pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A port or a regex fragment matching ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortPattern {
    Number(u32),
    Pattern(String),
}

impl fmt::Display for PortPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortPattern::Number(port) => write!(f, "{port}"),
            PortPattern::Pattern(pattern) => f.write_str(pattern),
        }
    }
}

impl From<u16> for PortPattern {
    fn from(port: u16) -> Self {
        PortPattern::Number(port.into())
    }
}

/// One declared attack.
///
/// Addresses and the protocol are regex fragments, so `10\.0\.0\.\d+` or
/// `TCP|UDP` work as well as literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRecord {
    pub direction: SessionDirection,
    pub protocol: String,
    #[serde(alias = "src ip")]
    pub src_ip: String,
    #[serde(alias = "dst ip")]
    pub dst_ip: String,
    #[serde(alias = "start ts")]
    pub start_ts: String,
    /// End of the window, exclusive; `"infinity"` runs to the end of the day.
    #[serde(alias = "end ts")]
    pub end_ts: String,
    pub label: String,
    #[serde(alias = "port list")]
    pub port_list: Vec<(PortPattern, PortPattern)>,
}

impl AttackRecord {
    fn patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        for (src_port, dst_port) in &self.port_list {
            patterns.push(format!(
                "({}) ({}) ({src_port}) ({}) ({dst_port})",
                self.protocol, self.src_ip, self.dst_ip
            ));
            if self.direction == SessionDirection::Bidirectional {
                patterns.push(format!(
                    "({}) ({}) ({dst_port}) ({}) ({src_port})",
                    self.protocol, self.dst_ip, self.src_ip
                ));
            }
        }
        patterns
    }
}

/// Half-open `[start, end)` time-of-day window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInterval {
    pub start: Time,
    pub end: Time,
    pub label: String,
}

impl LabelInterval {
    pub fn contains(&self, time: Time) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    matcher: Regex,
    intervals: Vec<LabelInterval>,
}

/// Session patterns and their windows, in first-registration order.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    rules: IndexMap<String, CompiledRule>,
}

impl CompiledRules {
    pub fn compile(records: &[AttackRecord]) -> Result<Self, LabelError> {
        let mut rules: IndexMap<String, CompiledRule> = IndexMap::new();
        for record in records {
            let interval = LabelInterval {
                start: parse_bound(&record.start_ts, record, false)?,
                end: parse_bound(&record.end_ts, record, true)?,
                label: record.label.clone(),
            };
            for pattern in record.patterns() {
                if let Some(rule) = rules.get_mut(&pattern) {
                    rule.intervals.push(interval.clone());
                    continue;
                }
                let matcher = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
                    LabelError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                rules.insert(
                    pattern,
                    CompiledRule {
                        matcher,
                        intervals: vec![interval.clone()],
                    },
                );
            }
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn intervals(&self, pattern: &str) -> Option<&[LabelInterval]> {
        self.rules.get(pattern).map(|rule| rule.intervals.as_slice())
    }

    /// Label for a flow identified by `info` that started at `timestamp`.
    ///
    /// Patterns match at the start of the joined 5-tuple. Every matching
    /// pattern is tried in order and the first window containing the
    /// timestamp's time of day wins.
    pub fn resolve(&self, info: &SessionKeyInfo, timestamp: &str, default_label: &str) -> String {
        let Some(time) = parse_time_of_day(timestamp) else {
            warn!(timestamp, "cannot read time of day, using default label");
            return default_label.to_string();
        };
        let subject = info.to_string();
        self.rules
            .values()
            .filter(|rule| rule.matcher.is_match(&subject))
            .flat_map(|rule| rule.intervals.iter())
            .find(|interval| interval.contains(time))
            .map_or_else(|| default_label.to_string(), |interval| interval.label.clone())
    }
}

fn parse_bound(value: &str, record: &AttackRecord, is_end: bool) -> Result<Time, LabelError> {
    if is_end && value.trim().eq_ignore_ascii_case(INFINITY) {
        return Ok(END_OF_DAY);
    }
    parse_time_of_day(value).ok_or_else(|| LabelError::Time {
        value: value.to_string(),
        label: record.label.clone(),
    })
}

/// Time of day of a `HH:MM[:SS[.ffffff]]` string, optionally preceded by a
/// date and a space or `T`.
pub fn parse_time_of_day(value: &str) -> Option<Time> {
    let value = value.trim();
    let clock = value
        .rsplit(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(value);
    let with_fraction = format_description!("[hour]:[minute]:[second].[subsecond]");
    let seconds = format_description!("[hour]:[minute]:[second]");
    let minutes = format_description!("[hour]:[minute]");
    Time::parse(clock, with_fraction)
        .or_else(|_| Time::parse(clock, seconds))
        .or_else(|_| Time::parse(clock, minutes))
        .ok()
}
