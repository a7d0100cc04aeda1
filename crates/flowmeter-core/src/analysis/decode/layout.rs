//! IEEE 802.15.4 MAC header layout.

/// IEEE 802.15.4 with a trailing FCS, and without.
pub const LINKTYPE_IEEE802_15_4_WITHFCS: i32 = 195;
pub const LINKTYPE_IEEE802_15_4_NOFCS: i32 = 230;

pub const FRAME_CONTROL_LEN: usize = 2;
pub const SEQUENCE_LEN: usize = 1;
pub const PAN_ID_LEN: usize = 2;
pub const SHORT_ADDR_LEN: usize = 2;
pub const LONG_ADDR_LEN: usize = 8;

pub const FRAME_TYPE_MASK: u16 = 0x0007;
pub const PAN_ID_COMPRESSION: u16 = 1 << 6;
pub const SEQUENCE_SUPPRESSION: u16 = 1 << 8;
pub const DST_ADDR_MODE_SHIFT: u16 = 10;
pub const FRAME_VERSION_SHIFT: u16 = 12;
pub const SRC_ADDR_MODE_SHIFT: u16 = 14;
pub const TWO_BIT_MASK: u16 = 0x3;

pub const ADDR_MODE_NONE: u8 = 0;
pub const ADDR_MODE_SHORT: u8 = 2;
pub const ADDR_MODE_LONG: u8 = 3;

/// Frame version from which sequence number suppression is honoured.
pub const FRAME_VERSION_2015: u8 = 2;
