use bytes::Bytes;

use crate::entity::{EntityId, MethodCall, SpaceId};
use crate::net::ServerAddress;
use crate::persist::SchemaDigest;

use super::error::SessionError;
use super::state::{ConnectionState, Tier};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    HelloAccepted {
        tier: Tier,
        server_version: String,
        server_script_version: String,
        digest: SchemaDigest,
    },
    SchemaImported {
        tier: Tier,
    },
    SchemaReused {
        digest: SchemaDigest,
    },
    LoginSucceeded {
        account: String,
        gameplay: ServerAddress,
    },
    AccountCreated {
        code: u16,
        description: String,
        server_datas: Bytes,
    },
    PasswordResetRequested {
        code: u16,
        description: String,
    },
    EnteredWorld {
        player: EntityId,
        entity_type: String,
        relogin: bool,
    },
    EntityCreated {
        id: EntityId,
        entity_type: String,
    },
    EntityUpdated {
        id: EntityId,
        properties: Vec<String>,
    },
    EntityDestroyed {
        id: EntityId,
        entity_type: String,
    },
    EntityMethod(MethodCall),
    PlayerDestroyed {
        id: EntityId,
    },
    SpaceDataChanged {
        space_id: SpaceId,
        key: Option<String>,
    },
    Failed(SessionError),
}
