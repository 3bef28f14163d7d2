//! Unix socket transport
//!
//! Clients discover the compositor through a named socket in the runtime
//! directory, see [`ListeningSocket`]. Each accepted connection is wrapped in a
//! [`BufferedSocket`], which accumulates received bytes and file descriptors
//! until the dispatcher consumes them, and holds the encoded events until the
//! kernel accepts them.

mod listener;
mod socket;

pub use self::listener::{BindError, ListeningSocket};
pub use self::socket::{BufferedSocket, Flushed, Received, MAX_FDS_IN, MAX_FDS_OUT};
