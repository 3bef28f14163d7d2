//! The compositor event loop
//!
//! [`CompositorLoop`] drives a [`Display`] from a [`calloop`] event loop. Each
//! [`tick`](CompositorLoop::tick) goes through three phases:
//!
//! - **Polling**: wait for readiness on the listening socket, the client sockets and
//!   any source the embedder added through [`handle`](CompositorLoop::handle), for at
//!   most [`LoopConfig::tick_timeout`].
//! - **Dispatching**: every client that became readable has its requests decoded and
//!   dispatched, in the order the clients became readable.
//! - **Flushing**: the queued events of every client are written to its socket.
//!
//! ```no_run
//! use acomp::{
//!     server::{Display, DisplayConfig},
//!     wayland::{event_loop::{CompositorLoop, LoopConfig}, socket::ListeningSocketSource},
//! };
//!
//! let display = Display::new(DisplayConfig::default());
//! let mut event_loop = CompositorLoop::new(display, (), LoopConfig::default()).unwrap();
//! event_loop.listen(ListeningSocketSource::new_auto().unwrap()).unwrap();
//! event_loop.handle_signals().unwrap();
//! event_loop.run().unwrap();
//! ```

use std::{
    fmt, io,
    os::unix::net::UnixStream,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use calloop::{
    generic::Generic,
    signals::{Signal, Signals},
    EventLoop, Interest, LoopHandle, LoopSignal, Mode, PostAction, RegistrationToken,
};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use super::socket::ListeningSocketSource;
use crate::{
    compositor::CompositorHandler,
    server::{ClientId, ClientStatus, DisconnectReason, Display},
};

/// Tunables of a [`CompositorLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Longest time a single poll may block
    pub tick_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            tick_timeout: Duration::from_millis(100),
        }
    }
}

/// Phase the loop is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between two ticks
    Idle,
    /// Waiting for readiness
    Polling,
    /// Dispatching client requests
    Dispatching,
    /// Writing queued events
    Flushing,
    /// Shut down, every client is disconnected
    Stopped,
}

/// State shared with the callbacks of the event loop
pub struct LoopData<H: 'static> {
    /// The display
    pub display: Display,
    /// The embedder's handler
    pub handler: H,
    handle: LoopHandle<'static, LoopData<H>>,
    tokens: IndexMap<ClientId, RegistrationToken>,
    readable: IndexSet<ClientId>,
    stop: Arc<AtomicBool>,
}

impl<H: fmt::Debug + 'static> fmt::Debug for LoopData<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopData")
            .field("display", &self.display)
            .field("handler", &self.handler)
            .field("tokens", &self.tokens)
            .field("readable", &self.readable)
            .finish_non_exhaustive()
    }
}

impl<H: CompositorHandler + 'static> LoopData<H> {
    /// Ask the loop to shut down at the end of the current tick
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }

    fn add_client(&mut self, stream: UnixStream) {
        let watched = match stream.try_clone() {
            Ok(watched) => watched,
            Err(err) => {
                warn!("Failed to register new client: {}", err);
                return;
            }
        };
        let id = match self.display.insert_client(stream, &mut self.handler) {
            Ok(id) => id,
            Err(err) => {
                warn!("Failed to register new client: {}", err);
                return;
            }
        };

        let source = Generic::new(watched, Interest::READ, Mode::Level);
        let inserted = self.handle.insert_source(source, move |_, _, data: &mut LoopData<H>| {
            data.readable.insert(id);
            Ok(PostAction::Continue)
        });
        match inserted {
            Ok(token) => {
                self.tokens.insert(id, token);
            }
            Err(err) => {
                warn!(client = %id, "Failed to watch client socket: {}", err.error);
                self.display
                    .kill_client(id, DisconnectReason::Io(io::ErrorKind::Other), &mut self.handler);
            }
        }
    }

    fn forget_client(&mut self, id: ClientId) {
        self.readable.shift_remove(&id);
        if let Some(token) = self.tokens.shift_remove(&id) {
            self.handle.remove(token);
        }
    }
}

/// Handle to stop a [`CompositorLoop`], usable from any thread
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    signal: LoopSignal,
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle").field("flag", &self.flag).finish_non_exhaustive()
    }
}

impl StopHandle {
    /// Request a shutdown and wake the loop up
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
        self.signal.wakeup();
    }
}

/// A single threaded compositor event loop
pub struct CompositorLoop<H: 'static> {
    event_loop: EventLoop<'static, LoopData<H>>,
    data: LoopData<H>,
    config: LoopConfig,
    state: LoopState,
}

impl<H: fmt::Debug + 'static> fmt::Debug for CompositorLoop<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositorLoop")
            .field("data", &self.data)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<H: CompositorHandler + 'static> CompositorLoop<H> {
    /// Create the event loop, owning the display and the handler
    pub fn new(display: Display, handler: H, config: LoopConfig) -> Result<CompositorLoop<H>, calloop::Error> {
        let event_loop = EventLoop::try_new()?;
        let data = LoopData {
            display,
            handler,
            handle: event_loop.handle(),
            tokens: IndexMap::new(),
            readable: IndexSet::new(),
            stop: Arc::new(AtomicBool::new(false)),
        };
        Ok(CompositorLoop {
            event_loop,
            data,
            config,
            state: LoopState::Idle,
        })
    }

    /// Accept clients from a listening socket
    pub fn listen(&mut self, source: ListeningSocketSource) -> Result<RegistrationToken, calloop::Error> {
        let token = self
            .event_loop
            .handle()
            .insert_source(source, |stream, _, data: &mut LoopData<H>| data.add_client(stream))
            .map_err(|err| err.error)?;
        Ok(token)
    }

    /// Shut down on SIGINT and SIGTERM
    pub fn handle_signals(&mut self) -> Result<RegistrationToken, calloop::Error> {
        let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])?;
        let token = self
            .event_loop
            .handle()
            .insert_source(signals, |event, _, data: &mut LoopData<H>| {
                info!(signal = ?event.signal(), "Received signal, shutting down");
                data.stop();
            })
            .map_err(|err| err.error)?;
        Ok(token)
    }

    /// A handle to stop the loop
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.data.stop.clone(),
            signal: self.event_loop.get_signal(),
        }
    }

    /// Handle to the underlying event loop, to insert more event sources
    pub fn handle(&self) -> LoopHandle<'static, LoopData<H>> {
        self.event_loop.handle()
    }

    /// Current phase of the loop
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The display
    pub fn display(&self) -> &Display {
        &self.data.display
    }

    /// The display, mutably
    pub fn display_mut(&mut self) -> &mut Display {
        &mut self.data.display
    }

    /// The handler
    pub fn handler(&self) -> &H {
        &self.data.handler
    }

    /// The handler, mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.data.handler
    }

    /// Run a single poll, dispatch and flush cycle
    pub fn tick(&mut self) -> Result<LoopState, calloop::Error> {
        if self.state == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }

        self.state = LoopState::Polling;
        if let Err(err) = self.event_loop.dispatch(Some(self.config.tick_timeout), &mut self.data) {
            self.state = LoopState::Idle;
            return Err(err);
        }

        self.state = LoopState::Dispatching;
        let readable: Vec<ClientId> = self.data.readable.drain(..).collect();
        for id in readable {
            let LoopData { display, handler, .. } = &mut self.data;
            if display.dispatch_client(id, handler) == ClientStatus::Closed {
                self.data.forget_client(id);
            }
        }

        self.state = LoopState::Flushing;
        let LoopData { display, handler, .. } = &mut self.data;
        for id in display.flush_clients(handler) {
            self.data.forget_client(id);
        }

        if self.data.stop.load(Ordering::Acquire) {
            self.shutdown();
        } else {
            self.state = LoopState::Idle;
        }
        Ok(self.state)
    }

    /// Tick until the loop is stopped
    pub fn run(&mut self) -> Result<(), calloop::Error> {
        info!("Starting event loop");
        while self.tick()? != LoopState::Stopped {}
        Ok(())
    }

    /// Flush every client, then disconnect them all
    pub fn shutdown(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        let LoopData { display, handler, .. } = &mut self.data;
        display.flush_clients(handler);
        display.shutdown(handler);
        let ids: Vec<ClientId> = self.data.tokens.keys().copied().collect();
        for id in ids {
            self.data.forget_client(id);
        }
        self.state = LoopState::Stopped;
        debug!("Event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use smallvec::smallvec;

    use super::*;
    use crate::{
        protocol::{wl_callback, wl_display},
        server::DisplayConfig,
        wire::{self, Argument, Message},
    };

    #[derive(Debug, Default)]
    struct Counter {
        connected: usize,
        disconnected: Vec<DisconnectReason>,
    }

    impl CompositorHandler for Counter {
        fn client_connected(&mut self, _client: ClientId) {
            self.connected += 1;
        }

        fn client_disconnected(&mut self, _client: ClientId, reason: &DisconnectReason) {
            self.disconnected.push(reason.clone());
        }

        fn commit(&mut self, _: ClientId, _: u32, _: &crate::compositor::SurfaceAttributes) {}
    }

    fn new_loop(dir: &std::path::Path) -> (CompositorLoop<Counter>, std::path::PathBuf) {
        let source = ListeningSocketSource::with_name_in(dir, "wayland-test").unwrap();
        let path = source.socket_path().to_path_buf();
        let config = LoopConfig {
            tick_timeout: Duration::from_millis(10),
        };
        let mut event_loop =
            CompositorLoop::new(Display::new(DisplayConfig::default()), Counter::default(), config).unwrap();
        event_loop.listen(source).unwrap();
        (event_loop, path)
    }

    fn read_frames(stream: &mut UnixStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn sync_over_a_real_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (mut event_loop, path) = new_loop(dir.path());

        let mut client = UnixStream::connect(&path).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut request = Vec::new();
        wire::encode(
            &Message::<std::os::unix::io::OwnedFd> {
                sender_id: 1,
                opcode: wl_display::REQ_SYNC,
                args: smallvec![Argument::NewId(2)],
            },
            &mut request,
        )
        .unwrap();
        client.write_all(&request).unwrap();

        for _ in 0..5 {
            assert_eq!(event_loop.tick().unwrap(), LoopState::Idle);
        }
        assert_eq!(event_loop.handler().connected, 1);

        // callback done, then delete_id
        let events = read_frames(&mut client, 24);
        let done = wire::parse_header(&events).unwrap();
        assert_eq!((done.object_id, done.opcode), (2, wl_callback::EVT_DONE));
        let delete = wire::parse_header(&events[12..]).unwrap();
        assert_eq!((delete.object_id, delete.opcode), (1, wl_display::EVT_DELETE_ID));
    }

    #[test]
    fn stop_handle_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let (mut event_loop, path) = new_loop(dir.path());

        let mut client = UnixStream::connect(&path).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        event_loop.tick().unwrap();
        assert_eq!(event_loop.display().clients().count(), 1);

        event_loop.stop_handle().stop();
        assert_eq!(event_loop.tick().unwrap(), LoopState::Stopped);
        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert_eq!(event_loop.display().clients().count(), 0);
        assert_eq!(event_loop.handler().disconnected, vec![DisconnectReason::Shutdown]);

        // the server closed its end
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
        assert_eq!(event_loop.tick().unwrap(), LoopState::Stopped);
    }

    #[test]
    fn hangup_unregisters_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let (mut event_loop, path) = new_loop(dir.path());

        let client = UnixStream::connect(&path).unwrap();
        event_loop.tick().unwrap();
        assert_eq!(event_loop.display().clients().count(), 1);

        drop(client);
        for _ in 0..3 {
            event_loop.tick().unwrap();
        }
        assert_eq!(event_loop.display().clients().count(), 0);
        assert!(event_loop.data.tokens.is_empty());
        assert_eq!(
            event_loop.handler().disconnected,
            vec![DisconnectReason::ConnectionClosed]
        );
    }
}
