use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MeterConfig;
use crate::features::{ConfigError, ExtractionError, ExtractorRegistry, FeatureRow};
use crate::labelling::{AttackRecord, CompiledRules, LabelError};
use crate::packet::PacketRecord;
use crate::source::{PacketSource, PcapFileSource, SourceError};

pub mod decode;
pub mod flows;
pub mod session;

use decode::decode_or_bare;
use flows::{Flow, FlowPacket, FlowSegmenter};
use session::{DefaultSessionExtractor, SessionExtractor, Sessionizer};

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Label rules error: {0}")]
    Labels(#[from] LabelError),
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("no flows were produced; the input holds no packets")]
    EmptyInput,
}

/// Feature rows sharing one column list, ordered by flow start time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Row cells rendered as text, in column order.
    pub fn text_rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default())
                .collect()
        })
    }
}

/// Session keying and flow segmentation for one run.
#[derive(Debug)]
pub struct FlowMeter {
    config: MeterConfig,
    sessions: Sessionizer,
}

impl FlowMeter {
    pub fn new(config: MeterConfig) -> Self {
        Self::with_session_extractor(config, DefaultSessionExtractor)
    }

    /// Use a custom session extractor instead of the protocol-based one.
    pub fn with_session_extractor<E: SessionExtractor + 'static>(
        config: MeterConfig,
        extractor: E,
    ) -> Self {
        let sessions = Sessionizer::new(Box::new(extractor), config.direction);
        Self { config, sessions }
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Split a packet sequence into flows sorted by start time.
    ///
    /// Input out of timestamp order is stably re-sorted first, so every
    /// packet lies within its flow's first and last timestamps.
    pub fn segment<I>(&self, packets: I) -> Vec<Flow>
    where
        I: IntoIterator<Item = PacketRecord>,
    {
        let mut records = packets.into_iter().collect::<Vec<_>>();
        let out_of_order = records
            .windows(2)
            .filter(|pair| pair[1].timestamp < pair[0].timestamp)
            .count();
        if out_of_order > 0 {
            warn!(out_of_order, "packets arrived out of timestamp order; reordering");
            records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        }

        let packets_total = records.len();
        let mut segmenter = FlowSegmenter::new(self.config.timeouts);
        for record in records {
            let (key, direction) = self.sessions.key(&record);
            segmenter.push(key, FlowPacket::new(record, direction));
        }
        let flows = segmenter.finish();
        info!(packets = packets_total, flows = flows.len(), "segmentation done");
        flows
    }

    /// Read, decode and segment every frame of `source`.
    ///
    /// The whole capture is decoded before segmenting, since captures from
    /// several interfaces need not be in global timestamp order.
    pub fn segment_source<S: PacketSource>(&self, mut source: S) -> Result<Vec<Flow>, MeterError> {
        let mut records = Vec::new();
        while let Some(frame) = source.next_frame()? {
            records.push(decode_or_bare(&frame));
        }
        debug!(frames = records.len(), "source drained");
        Ok(self.segment(records))
    }
}

/// Run every registered extractor over every flow.
///
/// Any extractor failure aborts the run; an empty flow list is reported as
/// [`MeterError::EmptyInput`].
pub fn extract_features(flows: &[Flow], registry: &ExtractorRegistry) -> Result<FeatureTable, MeterError> {
    if flows.is_empty() {
        return Err(MeterError::EmptyInput);
    }
    let rows = flows
        .iter()
        .map(|flow| registry.compute_features(flow))
        .collect::<Result<Vec<_>, _>>()?;
    let columns = rows
        .first()
        .map(|row| row.names().map(str::to_string).collect())
        .unwrap_or_default();
    info!(rows = rows.len(), extractors = registry.len(), "features extracted");
    Ok(FeatureTable { columns, rows })
}

/// Extractor registry for `config`, labelling with `attacks` when given.
pub fn build_registry(
    config: &MeterConfig,
    attacks: Option<&[AttackRecord]>,
) -> Result<ExtractorRegistry, MeterError> {
    let rules = attacks.map(CompiledRules::compile).transpose()?;
    if let Some(rules) = &rules {
        debug!(patterns = rules.len(), "label rules compiled");
    }
    Ok(ExtractorRegistry::from_config(config, rules)?)
}

/// Full pipeline over a packet source.
pub fn extract_source<S: PacketSource>(
    source: S,
    config: &MeterConfig,
    attacks: Option<&[AttackRecord]>,
) -> Result<FeatureTable, MeterError> {
    let registry = build_registry(config, attacks)?;
    let meter = FlowMeter::new(config.clone());
    let flows = meter.segment_source(source)?;
    extract_features(&flows, &registry)
}

/// Full pipeline over a PCAP or PCAPNG file.
pub fn extract_pcap_file(
    path: &Path,
    config: &MeterConfig,
    attacks: Option<&[AttackRecord]>,
) -> Result<FeatureTable, MeterError> {
    let source = PcapFileSource::open(path)?;
    extract_source(source, config, attacks)
}
