use std::fmt;

use crate::def::DefError;
use crate::entity::EntityError;
use crate::protocol::{ProtocolError, ServerRequest};

use super::state::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ConnectLogin,
    Login,
    ConnectGameplay,
    Gameplay,
    Relogin,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectLogin => "connecting to the login tier",
            Self::Login => "talking to the login tier",
            Self::ConnectGameplay => "connecting to the gameplay tier",
            Self::Gameplay => "talking to the gameplay tier",
            Self::Relogin => "reconnecting to the gameplay tier",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReport {
    Engine { client: String, server: String },
    Script { client: String, server: String },
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine { client, server } => {
                write!(f, "client version {client}, server version {server}")
            }
            Self::Script { client, server } => {
                write!(f, "client script version {client}, server script version {server}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("login refused ({code}): {description}")]
    AuthFailure { code: u16, description: String },
    #[error("version mismatch: {0}")]
    VersionMismatch(VersionReport),
    #[error("schema import failed: {0}")]
    SchemaImportFailure(String),
    #[error("connection failed while {stage}: {reason}")]
    ConnectionFailure { stage: Stage, reason: String },
    #[error("kicked by server ({code}): {description}")]
    Kicked { code: u16, description: String },
    #[error("re-login refused ({code}): {description}")]
    ReLoginFailure { code: u16, description: String },
    #[error("server stopped answering heartbeats")]
    LivenessTimeout,
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("no gameplay session to resume")]
    NoGameplaySession,
    #[error("server did not declare {0:?}")]
    UnknownRequest(ServerRequest),
    #[error("unknown entity type {0}")]
    UnknownEntityType(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error(transparent)]
    Entity(#[from] EntityError),
}

impl SessionError {
    pub(crate) fn schema(err: impl fmt::Display) -> Self {
        Self::SchemaImportFailure(err.to_string())
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

impl From<DefError> for SessionError {
    fn from(err: DefError) -> Self {
        Self::Entity(EntityError::Def(err))
    }
}
