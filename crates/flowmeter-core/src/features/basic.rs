use time::UtcOffset;

use crate::analysis::flows::Flow;

use super::{ExtractionError, FeatureExtractor, FeatureRow};

/// Session identity, timestamps and duration of a flow.
///
/// Readable timestamps are rendered at `offset`; the raw ones stay in UTC
/// epoch microseconds.
#[derive(Debug, Clone, Copy)]
pub struct BasicFlowInfo {
    offset: UtcOffset,
}

impl BasicFlowInfo {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Default for BasicFlowInfo {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl FeatureExtractor for BasicFlowInfo {
    fn name(&self) -> &str {
        "BasicFlowInfo"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let info = flow.info();
        let initial = flow
            .readable_initial_timestamp(self.offset)
            .map_err(|err| ExtractionError::failed(self.name(), flow, err))?;
        let last = flow
            .readable_last_timestamp(self.offset)
            .map_err(|err| ExtractionError::failed(self.name(), flow, err))?;

        let mut row = FeatureRow::new();
        row.insert("Session Key", flow.session_key().as_str());
        row.insert("Protocol", info.protocol.as_str());
        row.insert("Src IP", info.src_ip.as_str());
        row.insert("Src Port", info.src_port.as_str());
        row.insert("Dst IP", info.dst_ip.as_str());
        row.insert("Dst Port", info.dst_port.as_str());
        row.insert("Init Ts", initial);
        row.insert("Last Ts", last);
        row.insert("Ts", flow.initial_timestamp());
        row.insert("Last Raw Ts", flow.last_timestamp());
        row.insert("Duration", flow.duration());
        Ok(row)
    }
}
