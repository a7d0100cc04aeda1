use crate::analysis::flows::{Flow, FlowPacket};

use super::{ConfigError, DirectionalStat, ExtractionError, FeatureExtractor, FeatureRow};

/// Statistics of the gaps between consecutive packets, in microseconds.
#[derive(Debug)]
pub struct InterArrivalTime {
    gaps: DirectionalStat,
}

impl InterArrivalTime {
    pub fn new() -> Result<Self, ConfigError> {
        let gaps = DirectionalStat::builder("IAT").per_list(deltas).build()?;
        Ok(Self { gaps })
    }
}

fn deltas(packets: &[&FlowPacket]) -> Vec<f64> {
    packets
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp) as f64)
        .collect()
}

impl FeatureExtractor for InterArrivalTime {
    fn name(&self) -> &str {
        "InterArrivalTime"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let mut row = FeatureRow::new();
        self.gaps.write(flow, &mut row);
        Ok(row)
    }
}
