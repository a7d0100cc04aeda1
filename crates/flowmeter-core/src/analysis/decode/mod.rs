//! Frame decoding: raw link-layer frames into packet records.
//!
//! Ethernet and raw IP frames are sliced with `etherparse`; IEEE 802.15.4
//! MAC headers are read by hand. Frames that cannot be decoded still yield
//! a record carrying their timestamp and length, which session keying sends
//! to the catch-all session.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use error::DecodeError;
pub use parser::decode_frame;

use tracing::debug;

use crate::packet::PacketRecord;
use crate::source::RawFrame;

/// Decode `frame`, falling back to a record with no protocol layers.
pub fn decode_or_bare(frame: &RawFrame) -> PacketRecord {
    match decode_frame(frame) {
        Ok(record) => record,
        Err(err) => {
            debug!(
                timestamp = frame.timestamp,
                linktype = frame.linktype.0,
                error = %err,
                "undecodable frame"
            );
            PacketRecord::new(frame.timestamp, frame.wire_len)
        }
    }
}
