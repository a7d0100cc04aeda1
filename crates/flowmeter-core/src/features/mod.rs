//! Feature extraction over completed flows.
//!
//! Extractors are pure functions from a [`Flow`] to a [`FeatureRow`]
//! fragment. An [`ExtractorRegistry`] holds them in registration order and
//! merges their fragments into one row per flow; later extractors overwrite
//! earlier columns of the same name. Every extractor is probed once at
//! registration against an empty flow so the column set is known before any
//! real flow is processed.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::flows::Flow;
use crate::analysis::session::{EMPTY_KEY, SessionKey};
use crate::config::MeterConfig;
use crate::labelling::CompiledRules;

mod aggregate;
mod basic;
mod inter_arrival;
mod label;
mod mac_addr;
mod packet_counter;
mod tcp_flags;

pub use aggregate::{
    Aggregate, AggregatePolicy, DirectionalStat, DirectionalStatBuilder, aggregate,
    count_and_rate,
};
pub use basic::BasicFlowInfo;
pub use inter_arrival::InterArrivalTime;
pub use label::LabelExtractor;
pub use mac_addr::MacAddrInfo;
pub use packet_counter::PacketCounter;
pub use tcp_flags::TcpFlagCounter;

/// Single feature cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
    Set(BTreeSet<String>),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(value) => write!(f, "{value}"),
            FeatureValue::Float(value) => write!(f, "{value}"),
            FeatureValue::Text(value) => f.write_str(value),
            FeatureValue::Set(values) => {
                let joined = values.iter().map(String::as_str).collect::<Vec<_>>();
                f.write_str(&joined.join(";"))
            }
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Int(value)
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<BTreeSet<String>> for FeatureValue {
    fn from(value: BTreeSet<String>) -> Self {
        FeatureValue::Set(value)
    }
}

/// Ordered feature-name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRow(IndexMap<String, FeatureValue>);

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a column; an overwritten column keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Float view of a numeric column.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name)? {
            FeatureValue::Int(value) => Some(*value as f64),
            FeatureValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn merge(&mut self, other: FeatureRow) {
        self.0.extend(other.0);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Failure of one extractor on one flow.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extractor {extractor} failed on flow {session}: {message}")]
    Failed {
        extractor: String,
        session: String,
        message: String,
    },
    #[error("extractor {extractor} produced columns {actual:?}, expected {expected:?}")]
    ColumnMismatch {
        extractor: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

impl ExtractionError {
    pub fn failed(extractor: &str, flow: &Flow, message: impl fmt::Display) -> Self {
        ExtractionError::Failed {
            extractor: extractor.to_string(),
            session: flow.session_key().to_string(),
            message: message.to_string(),
        }
    }
}

/// Setup errors, raised before any flow is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("directional statistic '{0}' has neither a per-packet nor a per-list measure")]
    MissingMeasure(String),
    #[error("directional statistic '{0}' has both a per-packet and a per-list measure")]
    AmbiguousMeasure(String),
    #[error("UTC offset of {0} seconds is out of range")]
    UtcOffset(i32),
    #[error("extractor {name} cannot describe its columns: {source}")]
    Probe {
        name: String,
        #[source]
        source: ExtractionError,
    },
}

/// Computes a fragment of a feature row from a completed flow.
///
/// Extractors must not keep state between flows.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError>;
}

/// Built-in extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractorKind {
    BasicFlowInfo,
    MacAddrInfo,
    PacketCounter,
    TcpFlagCounter,
    InterArrivalTime,
    Label,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 6] = [
        ExtractorKind::BasicFlowInfo,
        ExtractorKind::MacAddrInfo,
        ExtractorKind::PacketCounter,
        ExtractorKind::TcpFlagCounter,
        ExtractorKind::InterArrivalTime,
        ExtractorKind::Label,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtractorKind::BasicFlowInfo => "BasicFlowInfo",
            ExtractorKind::MacAddrInfo => "MacAddrInfo",
            ExtractorKind::PacketCounter => "PacketCounter",
            ExtractorKind::TcpFlagCounter => "TcpFlagCounter",
            ExtractorKind::InterArrivalTime => "InterArrivalTime",
            ExtractorKind::Label => "Label",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtractorKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known = ExtractorKind::ALL.map(ExtractorKind::name).join(", ");
                format!("unknown extractor '{s}' (known: {known})")
            })
    }
}

struct Registered {
    extractor: Box<dyn FeatureExtractor>,
    columns: Vec<String>,
}

/// Ordered, caller-owned set of extractors.
#[derive(Default)]
pub struct ExtractorRegistry {
    entries: Vec<Registered>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of the built-ins enabled in `config`.
    ///
    /// Without `rules` the label column only carries labels already set on
    /// the flows.
    pub fn from_config(
        config: &MeterConfig,
        rules: Option<CompiledRules>,
    ) -> Result<Self, ConfigError> {
        let offset = config.utc_offset()?;
        let mut registry = Self::new();
        let mut rules = rules;
        for kind in &config.extractors {
            match kind {
                ExtractorKind::BasicFlowInfo => registry.register(BasicFlowInfo::new(offset))?,
                ExtractorKind::MacAddrInfo => registry.register(MacAddrInfo)?,
                ExtractorKind::PacketCounter => registry.register(PacketCounter::new()?)?,
                ExtractorKind::TcpFlagCounter => registry.register(TcpFlagCounter)?,
                ExtractorKind::InterArrivalTime => registry.register(InterArrivalTime::new()?)?,
                ExtractorKind::Label => {
                    let extractor = match rules.take() {
                        Some(rules) => LabelExtractor::new(rules, &config.default_label),
                        None => LabelExtractor::manual(),
                    };
                    registry.register(extractor.with_utc_offset(offset))?;
                }
            }
        }
        Ok(registry)
    }

    /// Probe the extractor against an empty flow and append it.
    pub fn register<E: FeatureExtractor + 'static>(&mut self, extractor: E) -> Result<(), ConfigError> {
        let probe = Flow::new(SessionKey::new(EMPTY_KEY));
        let columns = extractor
            .extract(&probe)
            .map_err(|source| ConfigError::Probe {
                name: extractor.name().to_string(),
                source,
            })?
            .names()
            .map(str::to_string)
            .collect();
        self.entries.push(Registered {
            extractor: Box::new(extractor),
            columns,
        });
        Ok(())
    }

    /// Register unless `enabled` is false.
    pub fn register_if<E: FeatureExtractor + 'static>(
        &mut self,
        enabled: bool,
        extractor: E,
    ) -> Result<(), ConfigError> {
        if enabled {
            self.register(extractor)?;
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.extractor.name())
    }

    /// Columns of one registered extractor, as enumerated at registration.
    pub fn columns_of(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.extractor.name() == name)
            .map(|entry| entry.columns.as_slice())
    }

    /// Merged column list in row order.
    pub fn columns(&self) -> Vec<String> {
        let mut row = IndexMap::<&str, ()>::new();
        for entry in &self.entries {
            for column in &entry.columns {
                row.insert(column, ());
            }
        }
        row.into_keys().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold every extractor's fragment into one row.
    pub fn compute_features(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let mut row = FeatureRow::new();
        for entry in &self.entries {
            let fragment = entry.extractor.extract(flow)?;
            if !fragment.names().eq(entry.columns.iter().map(String::as_str)) {
                return Err(ExtractionError::ColumnMismatch {
                    extractor: entry.extractor.name().to_string(),
                    expected: entry.columns.clone(),
                    actual: fragment.names().map(str::to_string).collect(),
                });
            }
            row.merge(fragment);
        }
        Ok(row)
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
