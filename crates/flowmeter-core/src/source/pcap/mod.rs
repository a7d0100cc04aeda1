//! PCAP/PCAPNG file source.
//!
//! Handles file I/O and container parsing only; frames leave this module
//! undecoded, tagged with the linktype of the interface they came from.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
