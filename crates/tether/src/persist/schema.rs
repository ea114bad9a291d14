use rkyv::rancor;
use rkyv::util::AlignedVec;

use super::StoreError;

pub const SCHEMA_FORMAT: u32 = 1;

/// Server-reported digests of the message protocol and the entity defs.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct SchemaDigest {
    pub protocol: String,
    pub entitydef: String,
}

impl SchemaDigest {
    pub fn new(protocol: &str, entitydef: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            entitydef: entitydef.to_string(),
        }
    }
}

/// Raw import bodies as received, replayed through the importers on reuse.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct PersistedSchema {
    pub format: u32,
    pub digest: SchemaDigest,
    pub auth_messages: Vec<u8>,
    pub gameplay_messages: Vec<u8>,
    pub server_errors: Vec<u8>,
    pub entity_defs: Vec<u8>,
}

impl PersistedSchema {
    pub fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(StoreError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, StoreError> {
        // archived data must be aligned, file contents are not
        let mut aligned: AlignedVec = AlignedVec::with_capacity(data.len());
        aligned.extend_from_slice(data);
        let schema = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(StoreError::Deserialize)?;
        if schema.format != SCHEMA_FORMAT {
            return Err(StoreError::UnsupportedFormat(schema.format));
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSchema {
        PersistedSchema {
            format: SCHEMA_FORMAT,
            digest: SchemaDigest::new("a1b2", "c3d4"),
            auth_messages: vec![1, 0, 9],
            gameplay_messages: vec![2, 0],
            server_errors: vec![0, 0],
            entity_defs: vec![0, 0, 0, 0],
        }
    }

    #[test]
    fn survives_unaligned_storage() {
        let bytes = sample().serialize().unwrap();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(PersistedSchema::deserialize(&shifted[1..]).unwrap(), sample());
    }

    #[test]
    fn rejects_garbage_and_other_formats() {
        assert!(matches!(
            PersistedSchema::deserialize(&[1, 2, 3]),
            Err(StoreError::Deserialize(_))
        ));

        let mut other = sample();
        other.format = 99;
        let bytes = other.serialize().unwrap();
        assert!(matches!(
            PersistedSchema::deserialize(&bytes),
            Err(StoreError::UnsupportedFormat(99))
        ));
    }
}
