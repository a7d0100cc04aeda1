use thiserror::Error;

/// Errors returned by frame decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("packet slice error: {0}")]
    Slice(String),
    #[error("unsupported linktype {0}")]
    UnsupportedLinktype(i32),
    #[error("frame too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("reserved 802.15.4 addressing mode {0}")]
    AddressingMode(u8),
}
