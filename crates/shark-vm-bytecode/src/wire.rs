//! Little-endian cursor primitives shared by the module and archive codecs

use crate::error::{BytecodeError, Result};

/// Read cursor over a byte slice
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(BytecodeError::UnexpectedEnd)?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// 4-byte length prefixed UTF-8 text
    pub(crate) fn str32(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        utf8(self.take(len)?)
    }

    /// 1-byte length prefixed UTF-8 text (archive header fields)
    pub(crate) fn str8(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        utf8(self.take(len)?)
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| BytecodeError::InvalidUtf8)
}

/// Growable output buffer
#[derive(Default)]
pub(crate) struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub(crate) fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub(crate) fn count16(&mut self, count: usize) -> Result<()> {
        let count = u16::try_from(count)
            .map_err(|_| BytecodeError::CountOverflow { count, width: 2 })?;
        self.u16(count);
        Ok(())
    }

    pub(crate) fn count32(&mut self, count: usize) -> Result<()> {
        let count = u32::try_from(count)
            .map_err(|_| BytecodeError::CountOverflow { count, width: 4 })?;
        self.u32(count);
        Ok(())
    }

    pub(crate) fn str32(&mut self, text: &str) -> Result<()> {
        self.count32(text.len())?;
        self.raw(text.as_bytes());
        Ok(())
    }

    pub(crate) fn str8(&mut self, text: &str) -> Result<()> {
        let len = u8::try_from(text.len()).map_err(|_| BytecodeError::NameTooLong(text.len()))?;
        self.u8(len);
        self.raw(text.as_bytes());
        Ok(())
    }
}
