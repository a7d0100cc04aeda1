//! Flowmeter core library: per-flow feature extraction from packet captures.
//!
//! Packets are keyed into direction-normalized sessions, each session is cut
//! into flows by an absolute lifetime cap (and optionally an inactivity gap),
//! and every completed flow is turned into one feature row by an ordered
//! registry of extractors. Rows can be labelled from declared attack windows.
//!
//! Capture I/O lives in `source`, frame decoding in `analysis::decode`; the
//! rest of the pipeline works on already decoded [`PacketRecord`] values and
//! never touches the filesystem.
//!
//! Invariants:
//! - Session keys depend only on protocol, address and port fields.
//! - Every packet of a flow lies between its first and last timestamps.
//! - All rows of a run share one column list, in extractor order.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use flowmeter_core::{MeterConfig, extract_pcap_file};
//!
//! let table = extract_pcap_file(Path::new("capture.pcapng"), &MeterConfig::default(), None)?;
//! println!("{} flows, {} columns", table.rows.len(), table.columns.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Working directly on records:
//! ```
//! use flowmeter_core::{FlowMeter, MeterConfig, PacketRecord, build_registry, extract_features};
//!
//! let records = (0..4).map(|i| {
//!     PacketRecord::new(10.0 + f64::from(i), 64)
//!         .with_ipv4("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap())
//!         .with_udp(5000, 53)
//! });
//! let config = MeterConfig::default();
//! let flows = FlowMeter::new(config.clone()).segment(records);
//! let table = extract_features(&flows, &build_registry(&config, None)?)?;
//! assert_eq!(table.rows.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod config;
pub mod features;
pub mod labelling;
pub mod packet;
pub mod source;

pub use analysis::flows::{Flow, FlowPacket, FlowSegmenter, Subset};
pub use analysis::session::{
    DefaultSessionExtractor, SessionExtractor, SessionKey, SessionKeyInfo, Sessionizer,
};
pub use analysis::{
    FeatureTable, FlowMeter, MeterError, build_registry, extract_features, extract_pcap_file,
    extract_source,
};
pub use config::{
    DEFAULT_ACTIVITY_TIMEOUT_US, DEFAULT_FLOW_TIMEOUT_US, DEFAULT_LABEL, FlowTimeouts,
    MeterConfig, SessionDirection,
};
pub use features::{
    ConfigError, ExtractionError, ExtractorKind, ExtractorRegistry, FeatureExtractor, FeatureRow,
    FeatureValue,
};
pub use labelling::{AttackRecord, CompiledRules, LabelError, PortPattern};
pub use packet::{Direction, FieldValue, PacketRecord, Protocol, TcpFlag, TcpFlags};
pub use source::{PacketSource, PcapFileSource, RawFrame, SourceError};
