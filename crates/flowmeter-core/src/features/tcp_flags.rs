use crate::analysis::flows::Flow;
use crate::packet::{Protocol, TcpFlag};

use super::{ExtractionError, FeatureExtractor, FeatureRow, count_and_rate};

/// Count and rate of each TCP control bit per direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFlagCounter;

fn column_base(flag: TcpFlag) -> &'static str {
    match flag {
        TcpFlag::Ack => "Flag Ack",
        TcpFlag::Cwr => "Flag Cwr",
        TcpFlag::Ece => "Flag Ece",
        TcpFlag::Fin => "Flag Fin",
        TcpFlag::Ns => "Flag Ns",
        TcpFlag::Psh => "Flag Psh",
        TcpFlag::Rst => "Flag Rst",
        TcpFlag::Syn => "Flag Syn",
        TcpFlag::Urg => "Flag Urg",
    }
}

impl FeatureExtractor for TcpFlagCounter {
    fn name(&self) -> &str {
        "TcpFlagCounter"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let is_tcp = flow.protocol() == Protocol::Tcp.name();
        let mut row = FeatureRow::new();
        for flag in TcpFlag::ALL {
            count_and_rate(&mut row, flow, column_base(flag), |packets| {
                if !is_tcp {
                    return 0;
                }
                packets
                    .iter()
                    .filter(|p| p.record.tcp_flags().is_some_and(|flags| flags.contains(flag)))
                    .count() as u64
            });
        }
        Ok(row)
    }
}
