use std::{collections::HashMap, io, os::unix::net::UnixStream};

use smallvec::smallvec;
use tracing::{debug, error, info, warn};

use super::{
    dispatch::{self, DispatchContext},
    ClientId, ClientState, DisconnectReason, Global, GlobalError, GlobalRegistry, ObjectData, DISPLAY_ID,
};
use crate::{
    compositor::CompositorHandler,
    protocol::{wl_buffer, wl_display, wl_registry, Interface},
    transport::{BufferedSocket, Flushed, Received, MAX_FDS_IN},
    utils::SerialCounter,
    wire::{Argument, Message, DEFAULT_MAX_MESSAGE_SIZE},
};

/// Tunables of a [`Display`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Largest accepted request frame, in bytes
    pub max_message_size: usize,
    /// `wl_shm` formats supported on top of ARGB8888 and XRGB8888
    pub shm_formats: Vec<u32>,
    /// Received file descriptors a client may have queued before it is disconnected
    pub max_fds_per_client: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            shm_formats: Vec::new(),
            max_fds_per_client: MAX_FDS_IN,
        }
    }
}

/// Whether a client survived an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// The client is still connected
    Alive,
    /// The client was disconnected and removed from the display
    Closed,
}

#[derive(Debug)]
struct Client {
    socket: BufferedSocket,
    state: ClientState,
}

/// The server side of the protocol
///
/// The display owns the clients and the globals. It does not do any I/O on
/// its own: the event loop tells it when a client is readable
/// ([`dispatch_client`](Display::dispatch_client)) and when to write the
/// queued events ([`flush_clients`](Display::flush_clients)).
#[derive(Debug)]
pub struct Display {
    clients: HashMap<ClientId, Client>,
    globals: GlobalRegistry,
    serials: SerialCounter,
    next_client_id: u64,
    config: DisplayConfig,
}

impl Display {
    /// Create a display without clients or globals
    pub fn new(config: DisplayConfig) -> Display {
        Display {
            clients: HashMap::new(),
            globals: GlobalRegistry::new(),
            serials: SerialCounter::default(),
            next_client_id: 1,
            config,
        }
    }

    /// Configuration of the display
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Add a client connected through `stream`
    ///
    /// The client starts with the display object, id 1.
    pub fn insert_client<H: CompositorHandler>(
        &mut self,
        stream: UnixStream,
        handler: &mut H,
    ) -> io::Result<ClientId> {
        let mut socket = BufferedSocket::new(stream)?;
        socket.set_max_fds_in(self.config.max_fds_per_client);
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        self.clients.insert(
            id,
            Client {
                socket,
                state: ClientState::new(id),
            },
        );
        info!(client = %id, "New client connected");
        handler.client_connected(id);
        Ok(id)
    }

    /// Protocol state of a client
    pub fn client(&self, id: ClientId) -> Option<&ClientState> {
        self.clients.get(&id).map(|client| &client.state)
    }

    /// Stream of a client, to watch it for readability
    pub fn client_stream(&self, id: ClientId) -> Option<&UnixStream> {
        self.clients.get(&id).map(|client| client.socket.stream())
    }

    /// Ids of the connected clients
    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    /// The table of globals
    pub fn globals(&self) -> &GlobalRegistry {
        &self.globals
    }

    /// Advertise a new global to every current and future registry
    pub fn create_global(&mut self, interface: Interface, version: u32) -> Result<Global, GlobalError> {
        let global = self.globals.advertise(interface, version)?;
        debug!(name = global.name, %interface, version, "Created global");
        for client in self.clients.values_mut() {
            for registry in client.state.registries() {
                client.state.send_event(
                    registry,
                    wl_registry::EVT_GLOBAL,
                    smallvec![
                        Argument::Uint(global.name),
                        Argument::Str(Some(interface.name().into())),
                        Argument::Uint(version),
                    ],
                );
            }
        }
        Ok(global)
    }

    /// Withdraw a global
    ///
    /// Every registry is sent `global_remove`. Objects already bound to the global
    /// stay alive. Removing an unknown global does nothing and returns `false`.
    pub fn remove_global(&mut self, name: u32) -> bool {
        let Some(global) = self.globals.withdraw(name) else {
            return false;
        };
        debug!(name, interface = %global.interface, "Removed global");
        for client in self.clients.values_mut() {
            for registry in client.state.registries() {
                client.state.send_event(
                    registry,
                    wl_registry::EVT_GLOBAL_REMOVE,
                    smallvec![Argument::Uint(name)],
                );
            }
        }
        true
    }

    /// Change the version offered to future binds of a global
    pub fn set_global_version(&mut self, name: u32, version: u32) -> Result<(), GlobalError> {
        self.globals.set_version(name, version)
    }

    /// Read and dispatch everything a client sent
    pub fn dispatch_client<H: CompositorHandler>(&mut self, id: ClientId, handler: &mut H) -> ClientStatus {
        let Some(client) = self.clients.get_mut(&id) else {
            return ClientStatus::Closed;
        };

        let received = match client.socket.fill_incoming_buffers() {
            Ok(received) => received,
            Err(err) => {
                warn!(client = %id, "Error reading from client: {}", err);
                self.kill_client(id, DisconnectReason::Io(err.kind()), handler);
                return ClientStatus::Closed;
            }
        };

        let (data, fds) = client.socket.incoming();
        let mut cx = DispatchContext {
            client: &mut client.state,
            globals: &self.globals,
            serials: &mut self.serials,
            config: &self.config,
            handler: &mut *handler,
        };
        match dispatch::dispatch_buffer(&mut cx, data, fds) {
            Ok(consumed) => client.socket.consume(consumed),
            Err(err) => {
                warn!(client = %id, "Protocol error: {}", err);
                self.kill_client(id, DisconnectReason::Protocol(err), handler);
                return ClientStatus::Closed;
            }
        }

        if received == Received::Disconnected {
            self.kill_client(id, DisconnectReason::ConnectionClosed, handler);
            return ClientStatus::Closed;
        }
        ClientStatus::Alive
    }

    /// Read and dispatch everything every client sent, returning the clients that were disconnected
    pub fn dispatch_clients<H: CompositorHandler>(&mut self, handler: &mut H) -> Vec<ClientId> {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.dispatch_client(*id, handler) == ClientStatus::Closed)
            .collect()
    }

    /// Write the queued events of a client
    pub fn flush_client<H: CompositorHandler>(&mut self, id: ClientId, handler: &mut H) -> ClientStatus {
        let Some(client) = self.clients.get_mut(&id) else {
            return ClientStatus::Closed;
        };
        write_events(id, client);
        match client.socket.flush() {
            Ok(Flushed::Done) | Ok(Flushed::Pending) => ClientStatus::Alive,
            Ok(Flushed::Disconnected) => {
                self.kill_client(id, DisconnectReason::ConnectionClosed, handler);
                ClientStatus::Closed
            }
            Err(err) => {
                warn!(client = %id, "Error writing to client: {}", err);
                self.kill_client(id, DisconnectReason::Io(err.kind()), handler);
                ClientStatus::Closed
            }
        }
    }

    /// Write the queued events of every client, returning the clients that were disconnected
    pub fn flush_clients<H: CompositorHandler>(&mut self, handler: &mut H) -> Vec<ClientId> {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.flush_client(*id, handler) == ClientStatus::Closed)
            .collect()
    }

    /// Disconnect a client and destroy all its objects
    ///
    /// If the reason is a protocol error, the client is sent a `wl_display.error`
    /// event first, on a best-effort basis.
    pub fn kill_client<H: CompositorHandler>(&mut self, id: ClientId, reason: DisconnectReason, handler: &mut H) {
        let Some(mut client) = self.clients.remove(&id) else {
            return;
        };
        if let DisconnectReason::Protocol(err) = &reason {
            let (object, code, message) = err.wire_error();
            write_events(id, &mut client);
            let event = Message {
                sender_id: DISPLAY_ID,
                opcode: wl_display::EVT_ERROR,
                args: smallvec![
                    Argument::Object(object),
                    Argument::Uint(code),
                    Argument::Str(Some(message)),
                ],
            };
            if client.socket.write_message(event).is_ok() {
                let _ = client.socket.flush();
            }
        }
        client.state.clear(handler);
        info!(client = %id, ?reason, "Client disconnected");
        handler.client_disconnected(id, &reason);
    }

    /// Flush and disconnect every client
    pub fn shutdown<H: CompositorHandler>(&mut self, handler: &mut H) {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            if let Some(client) = self.clients.get_mut(&id) {
                write_events(id, client);
                let _ = client.socket.flush();
            }
            self.kill_client(id, DisconnectReason::Shutdown, handler);
        }
    }

    /// Tell a client the compositor no longer reads a buffer
    ///
    /// Returns `false` if the client or the buffer is gone.
    pub fn release_buffer(&mut self, client: ClientId, buffer: u32) -> bool {
        let Some(client) = self.clients.get_mut(&client) else {
            return false;
        };
        let is_buffer = matches!(
            client.state.objects.get(buffer).map(|obj| &obj.data),
            Some(ObjectData::Buffer(_))
        );
        if is_buffer {
            client.state.send_event(buffer, wl_buffer::EVT_RELEASE, smallvec![]);
        }
        is_buffer
    }

    /// Fire the committed frame callbacks of a surface
    ///
    /// `time` is a timestamp in milliseconds, with an undefined base.
    pub fn send_frame_callbacks(&mut self, client: ClientId, surface: u32, time: u32) {
        if let Some(client) = self.clients.get_mut(&client) {
            fire_frame_callbacks(&mut client.state, surface, time);
        }
    }

    /// Fire the committed frame callbacks of every surface of every client
    pub fn send_all_frame_callbacks(&mut self, time: u32) {
        for client in self.clients.values_mut() {
            let surfaces: Vec<u32> = client
                .state
                .objects
                .iter()
                .filter(|obj| matches!(&obj.data, ObjectData::Surface(state) if !state.frame_callbacks.is_empty()))
                .map(|obj| obj.id)
                .collect();
            for surface in surfaces {
                fire_frame_callbacks(&mut client.state, surface, time);
            }
        }
    }
}

fn fire_frame_callbacks(state: &mut ClientState, surface: u32, time: u32) {
    let callbacks = match state.objects.get_mut(surface).map(|obj| &mut obj.data) {
        Some(ObjectData::Surface(surface_state)) => std::mem::take(&mut surface_state.frame_callbacks),
        _ => return,
    };
    for callback in callbacks {
        state.fire_callback(callback, time);
    }
}

fn write_events(id: ClientId, client: &mut Client) {
    for event in client.state.take_outgoing() {
        let (sender, opcode) = (event.sender_id, event.opcode);
        if let Err(err) = client.socket.write_message(event) {
            error!(client = %id, object = sender, opcode, "Failed to encode event: {}", err);
        }
    }
}
