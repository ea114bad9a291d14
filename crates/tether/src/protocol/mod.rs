mod args;
mod message;
mod table;

pub mod bootstrap {
    pub use super::table::{
        HELLO, IMPORT_CLIENT_ENTITY_DEF, IMPORT_CLIENT_MESSAGES, IMPORT_SERVER_ERRORS_DESCR,
        ON_HELLO_CB, ON_IMPORT_CLIENT_ENTITY_DEF, ON_IMPORT_CLIENT_ENTITY_DEF_COMPLETED,
        ON_IMPORT_CLIENT_MESSAGES, ON_IMPORT_CLIENT_MESSAGES_COMPLETED,
        ON_IMPORT_SERVER_ERRORS_DESCR, ON_SCRIPT_VERSION_NOT_MATCH, ON_VERSION_NOT_MATCH,
        bootstrap_descriptors, is_bootstrap_id,
    };
}

pub use args::Args;
pub use message::{
    ArgStyle, ClientHandler, MessageDescriptor, MessageLength, Route, ServerRequest,
};
pub use table::MessageTable;

use crate::stream::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("message id {0} declared twice")]
    DuplicateMessageId(u16),
    #[error("message id {0} is reserved for bootstrap messages")]
    ReservedMessageId(u16),
    #[error("server error code {0} declared twice")]
    DuplicateErrorCode(u16),
    #[error("request {0} declared twice")]
    DuplicateRequest(String),
    #[error("unknown argument type tag {0}")]
    UnknownTypeTag(u8),
    #[error("unknown argument style {0}")]
    UnknownArgStyle(u8),
    #[error("invalid message length {0}")]
    InvalidLength(i16),
    #[error("unknown message id {0}")]
    UnknownMessage(u16),
    #[error("argument {index} of {message} has the wrong type")]
    ArgumentMismatch { message: String, index: usize },
    #[error("{message} payload must be {expected} bytes, got {found}")]
    FixedLengthMismatch {
        message: String,
        expected: usize,
        found: usize,
    },
    #[error("{count} trailing bytes after {message}")]
    TrailingBytes { message: String, count: usize },
    #[error("{0} trailing bytes after import records")]
    TrailingImportBytes(usize),
}
