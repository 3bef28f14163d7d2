//! Server side of the protocol
//!
//! The [`Display`] owns every client connection along with the process-wide
//! [`GlobalRegistry`]. For each client it reads the bytes received on its socket,
//! decodes them one message at a time, and hands every message to the
//! dispatcher, which routes it to the handler of the target object's interface.
//! Events queued by the handlers are encoded and written back when the display
//! is flushed.
//!
//! Protocol errors are isolated to the client that caused them: the client is
//! sent a `wl_display.error` event, disconnected, and all of its objects are
//! destroyed. Other clients and the global table are left untouched.

mod client;
pub(crate) mod dispatch;
mod display;
mod globals;
mod objects;

#[cfg(test)]
mod tests;

use std::{fmt, io};

pub use self::client::{ClientState, ObjectData};
pub use self::display::{ClientStatus, Display, DisplayConfig};
pub use self::globals::{Global, GlobalError, GlobalRegistry};
pub use self::objects::{IdExhausted, InvalidId, Object, ObjectMap, SERVER_ID_START};

use crate::{
    protocol::{wl_display, Interface},
    wire::MessageParseError,
};

/// Id of the display object, which every client has
pub const DISPLAY_ID: u32 = 1;

/// Identifier of a client connection, never reused by a [`Display`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub(crate) u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A protocol violation by a client
///
/// All of these are fatal to the offending client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A message could not be parsed
    #[error("malformed message for object {object}: {error}")]
    Malformed {
        /// Object the message was addressed to
        object: u32,
        /// Parsing error
        #[source]
        error: MessageParseError,
    },
    /// A message targets or references an object that does not exist or has the wrong interface
    #[error("invalid object {0}")]
    InvalidObject(u32),
    /// A `new_id` argument cannot be used
    #[error("invalid new id {0}")]
    InvalidNewId(u32),
    /// The opcode does not exist for the interface and version of the object
    #[error("unknown request {opcode} on {interface}@{object}")]
    UnknownRequest {
        /// Target object
        object: u32,
        /// Interface of the target object
        interface: Interface,
        /// Received opcode
        opcode: u16,
    },
    /// The client tried to bind a global that does not exist (anymore)
    #[error("unknown global {0}")]
    UnknownGlobal(u32),
    /// The client bound a global with the wrong interface or an unsupported version
    #[error("invalid bind of global {name}: {reason}")]
    InvalidBind {
        /// Name of the global
        name: u32,
        /// What was wrong
        reason: String,
    },
    /// The server id space is exhausted
    #[error("object id space exhausted")]
    IdExhausted,
    /// An interface-specific error
    #[error("{interface}@{object}: {message}")]
    Interface {
        /// Object on which the error occurred
        object: u32,
        /// Interface of the object
        interface: Interface,
        /// Error code, as defined by the interface
        code: u32,
        /// Human readable description
        message: String,
    },
}

impl ProtocolError {
    /// Arguments of the `wl_display.error` event reporting this error
    ///
    /// Returns the object the error is about, the error code and the message.
    pub fn wire_error(&self) -> (u32, u32, String) {
        let message = self.to_string();
        match self {
            ProtocolError::Malformed { object, .. } => (*object, wl_display::ERROR_INVALID_METHOD, message),
            ProtocolError::UnknownRequest { object, .. } => {
                (*object, wl_display::ERROR_INVALID_METHOD, message)
            }
            ProtocolError::InvalidObject(_)
            | ProtocolError::InvalidNewId(_)
            | ProtocolError::UnknownGlobal(_)
            | ProtocolError::InvalidBind { .. } => (DISPLAY_ID, wl_display::ERROR_INVALID_OBJECT, message),
            ProtocolError::IdExhausted => (DISPLAY_ID, wl_display::ERROR_NO_MEMORY, message),
            ProtocolError::Interface { object, code, .. } => (*object, *code, message),
        }
    }
}

impl From<InvalidId> for ProtocolError {
    fn from(err: InvalidId) -> Self {
        ProtocolError::InvalidNewId(err.0)
    }
}

impl From<IdExhausted> for ProtocolError {
    fn from(_: IdExhausted) -> Self {
        ProtocolError::IdExhausted
    }
}

/// Why a client was disconnected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed its end of the connection
    ConnectionClosed,
    /// The client violated the protocol
    Protocol(ProtocolError),
    /// Reading from or writing to the client failed
    Io(io::ErrorKind),
    /// The compositor is shutting down
    Shutdown,
}
