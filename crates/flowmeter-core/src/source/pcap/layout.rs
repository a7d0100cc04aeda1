/// Bytes buffered by the pcap-parser readers.
pub const PCAP_READER_BUFFER_SIZE: usize = 65_536;

/// Section header block type, the first four bytes of every PCAPNG file.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// High bit of `if_tsresol` selects a power of two instead of ten.
pub const TSRESOL_BINARY_FLAG: u8 = 0x80;
