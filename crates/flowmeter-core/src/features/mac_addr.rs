use std::collections::BTreeSet;

use crate::analysis::flows::Flow;
use crate::packet::Protocol;

use super::{ExtractionError, FeatureExtractor, FeatureRow};

const ADDRESS_FIELDS: [&str; 4] = ["dst16", "dst64", "src16", "src64"];

/// Link-layer addresses seen on either side of a flow.
///
/// Only IEEE 802.15.4 frames carry the short/long addresses collected here;
/// other flows report an empty set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacAddrInfo;

impl FeatureExtractor for MacAddrInfo {
    fn name(&self) -> &str {
        "MacAddrInfo"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let mut addresses = BTreeSet::new();
        for packet in flow.packets() {
            for name in ADDRESS_FIELDS {
                if let Some(value) = packet.record.field(Protocol::Wpan, name) {
                    addresses.insert(value.to_string());
                }
            }
        }
        let mut row = FeatureRow::new();
        row.insert("Mac Addr", addresses);
        Ok(row)
    }
}
