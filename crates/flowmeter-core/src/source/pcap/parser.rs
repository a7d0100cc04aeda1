use std::fs::File;
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};
use tracing::debug;

use crate::source::{PacketSource, RawFrame, SourceError};

use super::error::PcapSourceError;
use super::layout;
use super::reader::{
    InterfaceInfo, interface_for_id, is_pcapng_magic, legacy_ts_to_seconds, pcapng_ts_to_seconds,
    read_magic_and_rewind, tsresol_units,
};

/// Reads frames from a PCAP or PCAPNG file, detected by magic number.
pub struct PcapFileSource {
    inner: PcapReader,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Linktype,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<File>,
        interfaces: Vec<InterfaceInfo>,
    },
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let inner = create_reader(file)?;
        Ok(Self { inner })
    }
}

impl PacketSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        Ok(next_frame(&mut self.inner)?)
    }
}

fn create_reader(mut file: File) -> Result<PcapReader, PcapSourceError> {
    let magic = read_magic_and_rewind(&mut file)?;

    if is_pcapng_magic(&magic) {
        let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
            .map_err(|e| PcapSourceError::pcap("pcapng reader init", e))?;
        Ok(PcapReader::Ng {
            reader,
            interfaces: Vec::new(),
        })
    } else {
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
            .map_err(|e| PcapSourceError::pcap("pcap reader init", e))?;
        Ok(PcapReader::Legacy {
            reader,
            linktype: Linktype::ETHERNET,
            nanosecond: false,
        })
    }
}

fn next_frame(reader: &mut PcapReader) -> Result<Option<RawFrame>, PcapSourceError> {
    match reader {
        PcapReader::Legacy {
            reader,
            linktype,
            nanosecond,
        } => next_legacy_frame(reader, linktype, nanosecond),
        PcapReader::Ng { reader, interfaces } => next_ng_frame(reader, interfaces),
    }
}

fn next_legacy_frame(
    reader: &mut LegacyPcapReader<File>,
    linktype: &mut Linktype,
    nanosecond: &mut bool,
) -> Result<Option<RawFrame>, PcapSourceError> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let frame = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *linktype = header.network;
                        *nanosecond = header.is_nanosecond_precision();
                        debug!(linktype = header.network.0, nanosecond = *nanosecond, "pcap header");
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => Some(RawFrame {
                        timestamp: legacy_ts_to_seconds(packet.ts_sec, packet.ts_usec, *nanosecond),
                        linktype: *linktype,
                        wire_len: packet.origlen,
                        data: packet.data.to_vec(),
                    }),
                    _ => None,
                };
                reader.consume(offset);
                if frame.is_some() {
                    return Ok(frame);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| PcapSourceError::pcap("pcap reader refill", e))?;
            }
            Err(e) => return Err(PcapSourceError::pcap("pcap reader next", e)),
        }
    }
}

fn next_ng_frame(
    reader: &mut PcapNGReader<File>,
    interfaces: &mut Vec<InterfaceInfo>,
) -> Result<Option<RawFrame>, PcapSourceError> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let frame = match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                        let tsresol = intf.if_tsresol;
                        let Some(units_per_second) = tsresol_units(tsresol) else {
                            return Err(PcapSourceError::Pcap {
                                context: "pcapng interface",
                                message: format!("unsupported if_tsresol {tsresol:#04x}"),
                            });
                        };
                        interfaces.push(InterfaceInfo {
                            linktype: intf.linktype,
                            units_per_second,
                            offset_secs: intf.if_tsoffset,
                        });
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                        let interface = interface_for_id(interfaces, packet.if_id);
                        Some(RawFrame {
                            timestamp: pcapng_ts_to_seconds(
                                packet.ts_high,
                                packet.ts_low,
                                &interface,
                            ),
                            linktype: interface.linktype,
                            wire_len: packet.origlen,
                            data: packet.data.to_vec(),
                        })
                    }
                    _ => None,
                };
                reader.consume(offset);
                if frame.is_some() {
                    return Ok(frame);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| PcapSourceError::pcap("pcapng reader refill", e))?;
            }
            Err(e) => return Err(PcapSourceError::pcap("pcapng reader next", e)),
        }
    }
}
