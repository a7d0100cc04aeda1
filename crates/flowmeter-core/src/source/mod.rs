//! Capture sources.
//!
//! A source yields raw link-layer frames with their capture time. Decoding
//! them into packet records happens in the analysis layer.

pub mod pcap;

pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use thiserror::Error;

/// One captured frame as stored in the capture file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Capture time in seconds since the epoch.
    pub timestamp: f64,
    pub linktype: Linktype,
    /// Length of the frame on the wire, which may exceed `data.len()` when
    /// the capture was truncated by a snap length.
    pub wire_len: u32,
    pub data: Vec<u8>,
}

pub trait PacketSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
}

impl From<pcap::error::PcapSourceError> for SourceError {
    fn from(value: pcap::error::PcapSourceError) -> Self {
        match value {
            pcap::error::PcapSourceError::Io(err) => SourceError::Io(err),
            pcap::error::PcapSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
        }
    }
}
