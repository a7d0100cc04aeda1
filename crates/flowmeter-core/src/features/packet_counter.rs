use crate::analysis::flows::Flow;

use super::{ConfigError, DirectionalStat, ExtractionError, FeatureExtractor, FeatureRow, count_and_rate};

/// Packet length statistics and packet/byte counts per direction.
#[derive(Debug)]
pub struct PacketCounter {
    length: DirectionalStat,
}

impl PacketCounter {
    pub fn new() -> Result<Self, ConfigError> {
        let length = DirectionalStat::builder("Pkt Len")
            .per_packet(|packet| f64::from(packet.record.length))
            .build()?;
        Ok(Self { length })
    }
}

impl FeatureExtractor for PacketCounter {
    fn name(&self) -> &str {
        "PacketCounter"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let mut row = FeatureRow::new();
        self.length.write(flow, &mut row);
        count_and_rate(&mut row, flow, "Pkt", |packets| packets.len() as u64);
        count_and_rate(&mut row, flow, "Byte", |packets| {
            packets.iter().map(|p| u64::from(p.record.length)).sum()
        });
        Ok(row)
    }
}
