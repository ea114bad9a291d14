mod schema;
mod store;

use std::io;

use rkyv::rancor;

pub use schema::{PersistedSchema, SCHEMA_FORMAT, SchemaDigest};
pub use store::{FileSchemaStore, MemorySchemaStore, SchemaStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("schema store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("unsupported schema cache format {0}")]
    UnsupportedFormat(u32),
}
