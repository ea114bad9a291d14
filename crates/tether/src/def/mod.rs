mod datatype;
mod entity_def;
mod value;

pub use datatype::{DataType, DataTypeCatalog, DataTypeDecl, DataTypeEntry, TypeBody, TypeIndex};
pub use entity_def::{
    EntityDefCatalog, EntityDefDecl, EntityTypeDecl, EntityTypeDescriptor, EntityTypeId,
    MethodDecl, MethodDescriptor, MethodKind, PropertyDecl, PropertyDescriptor, PropertyFlags,
};
pub use value::{PrimitiveKind, Value};

use crate::stream::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("data type {0} declared twice")]
    DuplicateType(String),
    #[error("reference to undeclared data type {0}")]
    UnknownTypeReference(u16),
    #[error("unknown base type {0}")]
    UnknownBaseType(String),
    #[error("data type {0} contains itself")]
    RecursiveType(String),
    #[error("data type index {0} out of range")]
    UnknownTypeIndex(usize),
    #[error("value of {0} nested too deeply")]
    NestingTooDeep(String),
    #[error("entity type {0} declared twice")]
    DuplicateEntityType(String),
    #[error("property {property} declared twice on {entity}")]
    DuplicateProperty { entity: String, property: String },
    #[error("unknown method kind {0}")]
    UnknownMethodKind(u8),
    #[error("unknown entity type {0}")]
    UnknownEntityType(String),
    #[error("{entity} has no property {property}")]
    UnknownProperty { entity: String, property: String },
    #[error("{entity} has no method {method}")]
    UnknownMethod { entity: String, method: String },
    #[error("method {method} takes {expected} arguments, got {found}")]
    ArgumentCount {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("expected a value of {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}
