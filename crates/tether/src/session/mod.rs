//! Two-tier login flow: auth tier handshake and credentials, hand-off to the
//! gameplay tier, then heartbeats and entity traffic until teardown.

mod catalog;
mod config;
mod controller;
mod error;
mod event;
mod state;

pub use catalog::CatalogState;
pub use config::{DEFAULT_AUTH_PORT, SessionConfig};
pub use controller::{AuthIntent, GameplaySession, ServerVersions, SessionController};
pub use error::{SessionError, Stage, VersionReport};
pub use event::SessionEvent;
pub use state::{ConnectionState, Tier};
