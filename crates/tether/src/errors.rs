use std::borrow::Cow;
use std::collections::HashMap;

use bytes::Bytes;

use crate::protocol::ProtocolError;
use crate::stream::{MemoryStream, StreamWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerErrorDescriptor {
    pub code: u16,
    pub name: String,
    pub description: String,
}

impl ServerErrorDescriptor {
    pub fn new(code: u16, name: &str, description: &str) -> Self {
        Self {
            code,
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Server error code to description table, imported once from the auth tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCatalog {
    errors: HashMap<u16, ServerErrorDescriptor>,
}

impl ErrorCatalog {
    pub fn import(body: Bytes) -> Result<Self, ProtocolError> {
        let mut stream = MemoryStream::new(body);
        let count = stream.read_u16()?;
        let mut errors = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let code = stream.read_u16()?;
            let name = stream.read_string()?;
            let description = stream.read_utf8_blob()?;
            if errors
                .insert(
                    code,
                    ServerErrorDescriptor {
                        code,
                        name,
                        description,
                    },
                )
                .is_some()
            {
                return Err(ProtocolError::DuplicateErrorCode(code));
            }
        }
        if !stream.is_empty() {
            return Err(ProtocolError::TrailingImportBytes(stream.remaining()));
        }
        log::debug!("Imported {} server error descriptions", errors.len());
        Ok(Self { errors })
    }

    pub fn encode(descriptors: &[ServerErrorDescriptor]) -> Bytes {
        let mut writer = StreamWriter::new();
        writer.write_u16(descriptors.len() as u16);
        for desc in descriptors {
            writer.write_u16(desc.code);
            writer.write_string(&desc.name);
            writer.write_blob(desc.description.as_bytes());
        }
        writer.freeze()
    }

    pub fn get(&self, code: u16) -> Option<&ServerErrorDescriptor> {
        self.errors.get(&code)
    }

    pub fn describe(&self, code: u16) -> Cow<'_, str> {
        match self.errors.get(&code) {
            Some(desc) => Cow::Borrowed(desc.description.as_str()),
            None => Cow::Owned(format!("unknown server error (code {code})")),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
