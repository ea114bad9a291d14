use bytes::{Buf, Bytes};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("short read: needed {needed} bytes, {remaining} remaining")]
    ShortRead { needed: usize, remaining: usize },
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("string terminator missing")]
    MissingTerminator,
}

/// Checked little-endian reader over a received payload.
///
/// Every read validates the remaining length first, so a truncated payload
/// yields `StreamError::ShortRead` instead of a panic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    data: Bytes,
}

impl MemoryStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    fn ensure(&self, needed: usize) -> Result<(), StreamError> {
        let remaining = self.data.remaining();
        if remaining < needed {
            return Err(StreamError::ShortRead { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, StreamError> {
        self.ensure(1)?;
        Ok(self.data.get_i8())
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        self.ensure(2)?;
        Ok(self.data.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16, StreamError> {
        self.ensure(2)?;
        Ok(self.data.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        self.ensure(4)?;
        Ok(self.data.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        self.ensure(8)?;
        Ok(self.data.get_u64_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        self.ensure(8)?;
        Ok(self.data.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        self.ensure(4)?;
        Ok(self.data.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        self.ensure(8)?;
        Ok(self.data.get_f64_le())
    }

    /// NUL-terminated UTF-8.
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or(StreamError::MissingTerminator)?;
        let raw = self.data.split_to(end);
        self.data.advance(1);
        String::from_utf8(raw.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }

    /// u32 length prefix followed by that many bytes.
    pub fn read_blob(&mut self) -> Result<Bytes, StreamError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_utf8_blob(&mut self) -> Result<String, StreamError> {
        let raw = self.read_blob()?;
        String::from_utf8(raw.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, StreamError> {
        self.ensure(len)?;
        Ok(self.data.split_to(len))
    }

    pub fn read_remaining(&mut self) -> Bytes {
        self.data.split_off(0)
    }
}
