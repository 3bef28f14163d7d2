//! Listening socket event source
//!
//! This module provides an [`EventSource`] that invokes a callback when a new client has connected to the
//! socket. This is how clients discover the compositor, through the `WAYLAND_DISPLAY` environment variable.
//!
//! The callback provides a [`UnixStream`] that represents the client connection. You need to create the
//! client using this stream by calling [`Display::insert_client`](crate::server::Display::insert_client),
//! which [`CompositorLoop::listen`](super::event_loop::CompositorLoop::listen) does for you.
//!
//! # Example usage
//!
//! ```no_run
//! use acomp::{reexports::calloop::EventLoop, wayland::socket::ListeningSocketSource};
//!
//! let event_loop = EventLoop::<Vec<std::os::unix::net::UnixStream>>::try_new().unwrap();
//!
//! // Create a socket for clients to discover the compositor.
//! //
//! // This function will select the next open name for a listening socket.
//! let listening_socket = ListeningSocketSource::new_auto().unwrap();
//!
//! event_loop
//!     .handle()
//!     .insert_source(listening_socket, |client_stream, _, pending| {
//!         pending.push(client_stream);
//!     })
//!     .unwrap();
//! ```

use std::{ffi::OsStr, io, os::unix::net::UnixStream, path::Path};

use calloop::{
    generic::Generic, EventSource, Interest, Mode, Poll, PostAction, Readiness, Token, TokenFactory,
};
use tracing::{debug, info, warn};

use crate::transport::{BindError, ListeningSocket};

/// A listening socket event source.
///
/// This implements [`EventSource`] and may be inserted into an event loop.
#[derive(Debug)]
pub struct ListeningSocketSource {
    socket: Generic<ListeningSocket>,
}

impl ListeningSocketSource {
    /// Creates a new listening socket, automatically choosing the next available `wayland` socket name.
    pub fn new_auto() -> Result<ListeningSocketSource, BindError> {
        // Try socket numbers 1-32. Remember the upper bound of Range is exclusive.
        //
        // We don't try wayland-0 since clients may connect to the wrong compositor. Clients these days
        // should be connecting based off the WAYLAND_DISPLAY environment variable.
        let socket = ListeningSocket::bind_auto("wayland", 1..33)?;
        Ok(Self::from_socket(socket))
    }

    /// Creates a new listening socket with the specified name.
    pub fn with_name(name: &str) -> Result<ListeningSocketSource, BindError> {
        let socket = ListeningSocket::bind(name)?;
        Ok(Self::from_socket(socket))
    }

    /// Creates a new listening socket with the specified name, in `dir` rather than the runtime directory.
    pub fn with_name_in<P: AsRef<Path>>(dir: P, name: &str) -> Result<ListeningSocketSource, BindError> {
        let socket = ListeningSocket::bind_in(dir, name)?;
        Ok(Self::from_socket(socket))
    }

    /// Wraps an already bound socket.
    pub fn from_socket(socket: ListeningSocket) -> ListeningSocketSource {
        info!(path = ?socket.socket_path(), "Created new socket");
        ListeningSocketSource {
            socket: Generic::new(socket, Interest::READ, Mode::Level),
        }
    }

    /// Returns the name of the listening socket.
    ///
    /// `None` if the socket was bound at an absolute path.
    pub fn socket_name(&self) -> Option<&OsStr> {
        self.socket.get_ref().socket_name()
    }

    /// Returns the full path of the listening socket.
    pub fn socket_path(&self) -> &Path {
        self.socket.get_ref().socket_path()
    }
}

impl EventSource for ListeningSocketSource {
    /// A stream to the new client.
    ///
    /// You must register the client using the stream by calling
    /// [`Display::insert_client`](crate::server::Display::insert_client).
    type Event = UnixStream;
    type Metadata = ();
    type Ret = ();
    type Error = io::Error;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> io::Result<PostAction>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        self.socket.process_events(readiness, token, |_, socket| {
            loop {
                match socket.accept() {
                    Ok(Some(client)) => {
                        debug!(socket = ?socket.socket_path(), client = ?client, "New client connected");
                        callback(client, &mut ());
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(socket = ?socket.socket_path(), "Failed to accept client: {}", err);
                        break;
                    }
                }
            }

            Ok(PostAction::Continue)
        })
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.socket.register(poll, token_factory)
    }

    fn reregister(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.socket.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.socket.unregister(poll)
    }
}
