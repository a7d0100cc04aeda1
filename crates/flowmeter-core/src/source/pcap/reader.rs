use std::io::{Read, Seek, SeekFrom};

use pcap_parser::Linktype;

use super::error::PcapSourceError;
use super::layout;

/// Read the magic bytes and rewind the reader to the start.
///
/// # Errors
/// Returns `PcapSourceError` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Capture parameters of one PCAPNG interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub linktype: Linktype,
    /// Timestamp ticks per second.
    pub units_per_second: u64,
    /// Seconds added to every timestamp of the interface.
    pub offset_secs: i64,
}

impl Default for InterfaceInfo {
    fn default() -> Self {
        Self {
            linktype: Linktype::ETHERNET,
            units_per_second: 1_000_000,
            offset_secs: 0,
        }
    }
}

/// Interface for a packet's `if_id`, defaulting to microsecond Ethernet.
pub fn interface_for_id(interfaces: &[InterfaceInfo], if_id: u32) -> InterfaceInfo {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or_default()
}

/// Ticks per second encoded by an `if_tsresol` option value.
///
/// Returns `None` for resolutions that do not fit in a `u64`.
pub fn tsresol_units(tsresol: u8) -> Option<u64> {
    let exponent = u32::from(tsresol & !layout::TSRESOL_BINARY_FLAG);
    if tsresol & layout::TSRESOL_BINARY_FLAG != 0 {
        1u64.checked_shl(exponent)
    } else {
        10u64.checked_pow(exponent)
    }
}

/// Convert a split PCAPNG timestamp to seconds.
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32, interface: &InterfaceInfo) -> f64 {
    let ticks = (u64::from(ts_high) << 32) | u64::from(ts_low);
    let units = interface.units_per_second.max(1);
    let whole = ticks / units;
    let fraction = (ticks % units) as f64 / units as f64;
    whole as f64 + fraction + interface.offset_secs as f64
}

/// Convert a legacy PCAP record timestamp to seconds.
///
/// `fraction` holds nanoseconds for nanosecond-precision files and
/// microseconds otherwise.
pub fn legacy_ts_to_seconds(ts_sec: u32, fraction: u32, nanosecond: bool) -> f64 {
    let scale = if nanosecond { 1e-9 } else { 1e-6 };
    f64::from(ts_sec) + f64::from(fraction) * scale
}
