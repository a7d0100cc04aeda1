use super::error::DecodeError;
use super::layout;

/// Cursor over an IEEE 802.15.4 MAC header.
pub struct WpanReader<'a> {
    frame: &'a [u8],
    offset: usize,
}

impl<'a> WpanReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { frame, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn require_len(&self, needed: usize) -> Result<(), DecodeError> {
        if self.frame.len() < needed {
            return Err(DecodeError::TooShort {
                needed,
                actual: self.frame.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.offset + len;
        self.require_len(end)?;
        let bytes = self.frame.get(self.offset..end).ok_or(DecodeError::TooShort {
            needed: end,
            actual: self.frame.len(),
        })?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read an address in the given mode; `None` when the mode carries none.
    pub fn read_address(&mut self, mode: u8) -> Result<Option<Address>, DecodeError> {
        match mode {
            layout::ADDR_MODE_NONE => Ok(None),
            layout::ADDR_MODE_SHORT => Ok(Some(Address::Short(self.read_u16_le()?))),
            layout::ADDR_MODE_LONG => Ok(Some(Address::Long(self.read_u64_le()?))),
            other => Err(DecodeError::AddressingMode(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Short(u16),
    Long(u64),
}
