pub mod def;
pub mod entity;
pub mod errors;
pub mod net;
pub mod persist;
pub mod protocol;
pub mod session;
pub mod stream;

pub use def::{EntityDefCatalog, Value};
pub use entity::{Entity, EntityId, EntityRegistry};
pub use net::{MemoryNetwork, ServerAddress, TcpConnector};
pub use persist::{FileSchemaStore, MemorySchemaStore, SchemaDigest, SchemaStore};
pub use session::{ConnectionState, SessionConfig, SessionController, SessionError, SessionEvent};
