mod alias;
mod pending;
mod registry;
mod space;

pub use alias::AliasTable;
pub use pending::{PendingKey, PendingUpdate, PendingUpdates, UpdateEncoding};
pub use registry::{ALIAS_LIMIT, Entity, EntityRegistry, MethodCall, RegistryEvent};
pub use space::SpaceData;

use crate::def::DefError;
use crate::stream::StreamError;

pub type EntityId = i32;
pub type SpaceId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("unknown entity type {0}")]
    UnknownEntityType(u16),
    #[error("{entity} has no property {property}")]
    UnknownPropertyRef { entity: String, property: u16 },
    #[error(transparent)]
    Def(#[from] DefError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}
