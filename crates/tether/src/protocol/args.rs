use bytes::Bytes;

use crate::def::Value;

use super::ProtocolError;

/// Positional accessor over the generically decoded arguments of a message.
pub struct Args {
    message: &'static str,
    index: usize,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    pub fn new(message: &'static str, values: Vec<Value>) -> Self {
        Self {
            message,
            index: 0,
            values: values.into_iter(),
        }
    }

    fn next(&mut self) -> Result<(usize, Value), ProtocolError> {
        let index = self.index;
        self.index += 1;
        self.values
            .next()
            .map(|value| (index, value))
            .ok_or_else(|| self.mismatch(index))
    }

    fn mismatch(&self, index: usize) -> ProtocolError {
        ProtocolError::ArgumentMismatch {
            message: self.message.to_string(),
            index,
        }
    }

    pub fn i8(&mut self) -> Result<i8, ProtocolError> {
        match self.next()? {
            (_, Value::Int8(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        match self.next()? {
            (_, Value::Uint16(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        match self.next()? {
            (_, Value::Int32(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        match self.next()? {
            (_, Value::Uint32(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        match self.next()? {
            (_, Value::Uint64(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn string(&mut self) -> Result<String, ProtocolError> {
        match self.next()? {
            (_, Value::String(v)) | (_, Value::Unicode(v)) => Ok(v),
            (index, _) => Err(self.mismatch(index)),
        }
    }

    pub fn blob(&mut self) -> Result<Bytes, ProtocolError> {
        match self.next()? {
            (_, Value::Blob(v)) => Ok(Bytes::from(v)),
            (index, _) => Err(self.mismatch(index)),
        }
    }
}
