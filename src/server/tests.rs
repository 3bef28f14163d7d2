//! End-to-end tests of the display, driven by a minimal client over a socket pair

use std::{
    collections::HashMap,
    io::Write,
    os::unix::{io::OwnedFd, net::UnixStream},
};

use smallvec::{smallvec, SmallVec};

use super::*;
use crate::{
    compositor::{BufferAssignment, CompositorHandler, SurfaceAttributes},
    protocol::{wl_compositor, wl_region, wl_registry, wl_shm, wl_shm_pool, wl_surface},
    transport::{BufferedSocket, Flushed, Received},
    wire::{self, Argument, Message},
};

#[derive(Debug, PartialEq)]
enum Note {
    Connected(ClientId),
    Disconnected(ClientId, DisconnectReason),
    NewSurface(u32),
    SurfaceDestroyed(u32),
    BufferDestroyed(u32),
}

#[derive(Debug, Default)]
struct Recorder {
    notes: Vec<Note>,
    commits: Vec<(ClientId, u32, SurfaceAttributes)>,
}

impl CompositorHandler for Recorder {
    fn client_connected(&mut self, client: ClientId) {
        self.notes.push(Note::Connected(client));
    }

    fn client_disconnected(&mut self, client: ClientId, reason: &DisconnectReason) {
        self.notes.push(Note::Disconnected(client, reason.clone()));
    }

    fn new_surface(&mut self, _client: ClientId, surface: u32) {
        self.notes.push(Note::NewSurface(surface));
    }

    fn commit(&mut self, client: ClientId, surface: u32, attributes: &SurfaceAttributes) {
        self.commits.push((client, surface, attributes.clone()));
    }

    fn surface_destroyed(&mut self, _client: ClientId, surface: u32) {
        self.notes.push(Note::SurfaceDestroyed(surface));
    }

    fn buffer_destroyed(&mut self, _client: ClientId, buffer: u32) {
        self.notes.push(Note::BufferDestroyed(buffer));
    }
}

#[derive(Debug)]
struct Event {
    object: u32,
    name: &'static str,
    args: Vec<Argument<OwnedFd>>,
}

impl Event {
    fn uint(&self, index: usize) -> u32 {
        match self.args[index] {
            Argument::Uint(v) | Argument::Object(v) => v,
            ref other => panic!("argument {} of {} is {:?}", index, self.name, other),
        }
    }

    fn string(&self, index: usize) -> &str {
        match &self.args[index] {
            Argument::Str(Some(s)) => s,
            other => panic!("argument {} of {} is {:?}", index, self.name, other),
        }
    }
}

struct TestClient {
    socket: BufferedSocket,
    interfaces: HashMap<u32, Interface>,
    next_id: u32,
    closed: bool,
}

impl TestClient {
    fn new(stream: UnixStream) -> TestClient {
        TestClient {
            socket: BufferedSocket::new(stream).unwrap(),
            interfaces: [(DISPLAY_ID, Interface::Display)].into_iter().collect(),
            next_id: 2,
            closed: false,
        }
    }

    fn new_id(&mut self, interface: Interface) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.interfaces.insert(id, interface);
        id
    }

    fn send(&mut self, object: u32, opcode: u16, args: SmallVec<[Argument<OwnedFd>; 4]>) {
        self.socket
            .write_message(Message {
                sender_id: object,
                opcode,
                args,
            })
            .unwrap();
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        self.flush();
        let mut stream = self.socket.stream();
        stream.write_all(bytes).unwrap();
    }

    fn flush(&mut self) {
        assert_eq!(self.socket.flush().unwrap(), Flushed::Done);
    }

    fn get_registry(&mut self) -> u32 {
        let registry = self.new_id(Interface::Registry);
        self.send(
            DISPLAY_ID,
            wl_display::REQ_GET_REGISTRY,
            smallvec![Argument::NewId(registry)],
        );
        registry
    }

    fn bind(&mut self, registry: u32, name: u32, interface: Interface, version: u32) -> u32 {
        let id = self.new_id(interface);
        self.send(
            registry,
            wl_registry::REQ_BIND,
            smallvec![
                Argument::Uint(name),
                Argument::Str(Some(interface.name().into())),
                Argument::Uint(version),
                Argument::NewId(id),
            ],
        );
        id
    }

    fn sync(&mut self) -> u32 {
        let callback = self.new_id(Interface::Callback);
        self.send(DISPLAY_ID, wl_display::REQ_SYNC, smallvec![Argument::NewId(callback)]);
        callback
    }

    fn create_surface(&mut self, compositor: u32) -> u32 {
        let surface = self.new_id(Interface::Surface);
        self.send(
            compositor,
            wl_compositor::REQ_CREATE_SURFACE,
            smallvec![Argument::NewId(surface)],
        );
        surface
    }

    fn read_events(&mut self) -> Vec<Event> {
        if self.socket.fill_incoming_buffers().unwrap() == Received::Disconnected {
            self.closed = true;
        }
        let mut events = Vec::new();
        let (data, fds) = self.socket.incoming();
        let mut consumed = 0;
        while consumed < data.len() {
            let header = wire::parse_header(&data[consumed..]).unwrap();
            let interface = self.interfaces[&header.object_id];
            let desc = interface.event(header.opcode).unwrap();
            let (msg, used) = wire::decode(&data[consumed..], fds, desc.signature, 4096).unwrap();
            consumed += used;
            events.push(Event {
                object: msg.sender_id,
                name: desc.name,
                args: msg.args.into_iter().collect(),
            });
        }
        self.socket.consume(consumed);
        events
    }
}

struct Harness {
    display: Display,
    handler: Recorder,
}

impl Harness {
    /// A display advertising `wl_compositor` as global 1 and `wl_shm` as global 2
    fn new() -> Harness {
        Harness::with_config(DisplayConfig::default())
    }

    fn with_config(config: DisplayConfig) -> Harness {
        let mut display = Display::new(config);
        display.create_global(Interface::Compositor, 4).unwrap();
        display.create_global(Interface::Shm, 1).unwrap();
        Harness {
            display,
            handler: Recorder::default(),
        }
    }

    fn connect(&mut self) -> (ClientId, TestClient) {
        let (server, client) = UnixStream::pair().unwrap();
        let id = self.display.insert_client(server, &mut self.handler).unwrap();
        (id, TestClient::new(client))
    }

    /// Deliver what the client wrote and return the events it received
    fn roundtrip(&mut self, client: &mut TestClient) -> Vec<Event> {
        client.flush();
        self.display.dispatch_clients(&mut self.handler);
        self.display.flush_clients(&mut self.handler);
        client.read_events()
    }

    fn disconnect_reason(&self, client: ClientId) -> Option<&DisconnectReason> {
        self.handler.notes.iter().find_map(|note| match note {
            Note::Disconnected(id, reason) if *id == client => Some(reason),
            _ => None,
        })
    }
}

fn names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|e| e.name).collect()
}

fn assert_protocol_error(events: &[Event], object: u32, code: u32) {
    let error = events
        .iter()
        .find(|e| e.name == "error")
        .expect("no error event received");
    assert_eq!(error.object, DISPLAY_ID);
    assert_eq!(error.uint(0), object);
    assert_eq!(error.uint(1), code);
}

#[test]
fn registry_replays_globals() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    assert_eq!(harness.handler.notes, vec![Note::Connected(id)]);

    let registry = client.get_registry();
    let events = harness.roundtrip(&mut client);
    assert_eq!(names(&events), vec!["global", "global"]);
    assert!(events.iter().all(|e| e.object == registry));
    assert_eq!(
        (events[0].uint(0), events[0].string(1), events[0].uint(2)),
        (1, "wl_compositor", 4)
    );
    assert_eq!((events[1].uint(0), events[1].string(1), events[1].uint(2)), (2, "wl_shm", 1));
}

#[test]
fn sync_roundtrip() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let first = client.sync();
    let second = client.sync();
    let events = harness.roundtrip(&mut client);

    assert_eq!(names(&events), vec!["done", "delete_id", "done", "delete_id"]);
    assert_eq!(events[0].object, first);
    assert_eq!(events[1].uint(0), first);
    assert_eq!(events[2].object, second);
    assert_eq!(events[3].uint(0), second);
    // serials increase
    assert!(events[2].uint(0) > events[0].uint(0));
    // only the display is left
    assert_eq!(harness.display.client(id).unwrap().objects().len(), 1);
}

#[test]
fn new_objects_are_usable_in_the_same_read() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 1);
    assert_eq!(compositor, 3);
    let surface = client.create_surface(compositor);
    assert_eq!(surface, 4);
    client.send(surface, wl_surface::REQ_COMMIT, smallvec![]);

    harness.roundtrip(&mut client);
    assert_eq!(harness.handler.notes, vec![Note::Connected(id), Note::NewSurface(4)]);
    assert_eq!(harness.handler.commits.len(), 1);
    assert_eq!(harness.handler.commits[0].1, surface);

    let state = harness.display.client(id).unwrap();
    let surface = state.objects().get(surface).unwrap();
    assert_eq!(surface.interface, Interface::Surface);
    assert_eq!(surface.version, 1);
    assert_eq!(surface.parent(), Some(compositor));
}

#[test]
fn malformed_message_only_kills_its_client() {
    let mut harness = Harness::new();
    let (a, mut client_a) = harness.connect();
    let (b, mut client_b) = harness.connect();
    let registry = client_a.get_registry();
    client_b.get_registry();
    harness.roundtrip(&mut client_a);
    harness.roundtrip(&mut client_b);

    // bind whose string length runs past the end of the frame
    let mut raw = Vec::new();
    raw.extend_from_slice(&registry.to_le_bytes());
    raw.extend_from_slice(&((24u32 << 16) | wl_registry::REQ_BIND as u32).to_le_bytes());
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.extend_from_slice(&100u32.to_le_bytes());
    raw.extend_from_slice(b"wl_compo");
    client_a.send_raw(&raw);

    let events = harness.roundtrip(&mut client_a);
    assert_protocol_error(&events, registry, wl_display::ERROR_INVALID_METHOD);
    assert!(client_a.closed);
    assert!(matches!(
        harness.disconnect_reason(a),
        Some(DisconnectReason::Protocol(ProtocolError::Malformed { .. }))
    ));
    assert!(harness.display.client(a).is_none());

    let callback = client_b.sync();
    let events = harness.roundtrip(&mut client_b);
    assert_eq!(names(&events), vec!["done", "delete_id"]);
    assert_eq!(events[0].object, callback);
    assert!(harness.display.client(b).is_some());
    assert!(harness.disconnect_reason(b).is_none());
}

#[test]
fn oversized_frame_is_rejected() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let mut raw = Vec::new();
    raw.extend_from_slice(&DISPLAY_ID.to_le_bytes());
    raw.extend_from_slice(&((8192u32 << 16) | wl_display::REQ_SYNC as u32).to_le_bytes());
    client.send_raw(&raw);

    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, DISPLAY_ID, wl_display::ERROR_INVALID_METHOD);
    assert!(matches!(
        harness.disconnect_reason(a),
        Some(DisconnectReason::Protocol(ProtocolError::Malformed {
            error: wire::MessageParseError::TooLarge { size: 8192, max: 4096 },
            ..
        }))
    ));
}

#[test]
fn partial_frames_wait_for_more_data() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let callback = 2u32;
    client.interfaces.insert(callback, Interface::Callback);
    let mut raw = Vec::new();
    raw.extend_from_slice(&DISPLAY_ID.to_le_bytes());
    raw.extend_from_slice(&((12u32 << 16) | wl_display::REQ_SYNC as u32).to_le_bytes());
    raw.extend_from_slice(&callback.to_le_bytes());

    client.send_raw(&raw[..6]);
    assert!(harness.roundtrip(&mut client).is_empty());
    assert!(harness.display.client(id).is_some());

    client.send_raw(&raw[6..]);
    let events = harness.roundtrip(&mut client);
    assert_eq!(names(&events), vec!["done", "delete_id"]);
}

#[test]
fn unknown_object_is_fatal() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    client.send(42, 0, smallvec![]);
    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, DISPLAY_ID, wl_display::ERROR_INVALID_OBJECT);
    assert_eq!(
        harness.disconnect_reason(a),
        Some(&DisconnectReason::Protocol(ProtocolError::InvalidObject(42)))
    );
}

#[test]
fn unknown_opcode_is_fatal() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    client.send(DISPLAY_ID, 7, smallvec![]);
    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, DISPLAY_ID, wl_display::ERROR_INVALID_METHOD);
    assert_eq!(
        harness.disconnect_reason(a),
        Some(&DisconnectReason::Protocol(ProtocolError::UnknownRequest {
            object: DISPLAY_ID,
            interface: Interface::Display,
            opcode: 7
        }))
    );
}

#[test]
fn request_above_object_version_is_unknown() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 2);
    let surface = client.create_surface(compositor);
    client.send(surface, wl_surface::REQ_SET_BUFFER_SCALE, smallvec![Argument::Int(2)]);
    harness.roundtrip(&mut client);
    assert!(matches!(
        harness.disconnect_reason(a),
        Some(DisconnectReason::Protocol(ProtocolError::UnknownRequest { opcode: 8, .. }))
    ));
}

#[test]
fn destroyed_ids_are_not_reused() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let region = client.new_id(Interface::Region);
    client.send(compositor, wl_compositor::REQ_CREATE_REGION, smallvec![Argument::NewId(region)]);
    client.send(region, wl_region::REQ_DESTROY, smallvec![]);
    let events = harness.roundtrip(&mut client);
    let deleted: Vec<u32> = events
        .iter()
        .filter(|e| e.name == "delete_id")
        .map(|e| e.uint(0))
        .collect();
    assert_eq!(deleted, vec![region]);

    client.send(compositor, wl_compositor::REQ_CREATE_REGION, smallvec![Argument::NewId(region)]);
    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, DISPLAY_ID, wl_display::ERROR_INVALID_OBJECT);
    assert_eq!(
        harness.disconnect_reason(a),
        Some(&DisconnectReason::Protocol(ProtocolError::InvalidNewId(region)))
    );
}

#[test]
fn destroyed_object_arguments_are_invalid() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let surface = client.create_surface(compositor);
    let region = client.new_id(Interface::Region);
    client.send(compositor, wl_compositor::REQ_CREATE_REGION, smallvec![Argument::NewId(region)]);
    client.send(region, wl_region::REQ_DESTROY, smallvec![]);
    client.send(
        surface,
        wl_surface::REQ_SET_INPUT_REGION,
        smallvec![Argument::Object(region)],
    );
    harness.roundtrip(&mut client);
    assert_eq!(
        harness.disconnect_reason(a),
        Some(&DisconnectReason::Protocol(ProtocolError::InvalidObject(region)))
    );
}

#[test]
fn globals_are_announced_once_per_registry() {
    let mut harness = Harness::new();
    let (_, mut first) = harness.connect();
    let (_, mut second) = harness.connect();
    first.get_registry();
    first.get_registry();
    second.get_registry();
    harness.roundtrip(&mut first);
    harness.roundtrip(&mut second);

    let global = harness.display.create_global(Interface::Shm, 1).unwrap();
    assert_eq!(global.name, 3);
    harness.display.flush_clients(&mut harness.handler);
    let events = first.read_events();
    assert_eq!(names(&events), vec!["global", "global"]);
    assert!(events.iter().all(|e| e.uint(0) == 3));
    assert_eq!(names(&second.read_events()), vec!["global"]);

    assert!(harness.display.remove_global(global.name));
    assert!(!harness.display.remove_global(global.name));
    harness.display.flush_clients(&mut harness.handler);
    let events = first.read_events();
    assert_eq!(names(&events), vec!["global_remove", "global_remove"]);
    assert!(events.iter().all(|e| e.uint(0) == 3));
    assert_eq!(names(&second.read_events()), vec!["global_remove"]);
}

#[test]
fn bind_after_withdraw_fails_without_touching_existing_binds() {
    let mut harness = Harness::new();
    let (first_id, mut first) = harness.connect();
    let (second_id, mut second) = harness.connect();

    let registry = first.get_registry();
    let compositor = first.bind(registry, 1, Interface::Compositor, 4);
    harness.roundtrip(&mut first);

    assert!(harness.display.remove_global(1));
    let events = {
        harness.display.flush_clients(&mut harness.handler);
        first.read_events()
    };
    assert_eq!(names(&events), vec!["global_remove"]);

    let registry = second.get_registry();
    second.bind(registry, 1, Interface::Compositor, 4);
    let events = harness.roundtrip(&mut second);
    assert_protocol_error(&events, DISPLAY_ID, wl_display::ERROR_INVALID_OBJECT);
    assert_eq!(
        harness.disconnect_reason(second_id),
        Some(&DisconnectReason::Protocol(ProtocolError::UnknownGlobal(1)))
    );

    let surface = first.create_surface(compositor);
    harness.roundtrip(&mut first);
    assert!(harness.handler.notes.contains(&Note::NewSurface(surface)));
    assert!(harness.disconnect_reason(first_id).is_none());
}

#[test]
fn bind_checks_interface_and_version() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let registry = client.get_registry();
    client.bind(registry, 2, Interface::Shm, 2);
    harness.roundtrip(&mut client);
    assert!(matches!(
        harness.disconnect_reason(a),
        Some(DisconnectReason::Protocol(ProtocolError::InvalidBind { name: 2, .. }))
    ));

    let (b, mut client) = harness.connect();
    let registry = client.get_registry();
    // name 1 is the compositor
    client.bind(registry, 1, Interface::Shm, 1);
    harness.roundtrip(&mut client);
    assert!(matches!(
        harness.disconnect_reason(b),
        Some(DisconnectReason::Protocol(ProtocolError::InvalidBind { name: 1, .. }))
    ));
}

#[test]
fn shm_buffers_reach_the_handler() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let shm = client.bind(registry, 2, Interface::Shm, 1);
    let events = harness.roundtrip(&mut client);
    let formats: Vec<u32> = events
        .iter()
        .filter(|e| e.object == shm)
        .map(|e| e.uint(0))
        .collect();
    assert_eq!(formats, vec![wl_shm::FORMAT_ARGB8888, wl_shm::FORMAT_XRGB8888]);

    let file = tempfile::tempfile().unwrap();
    file.set_len(4096).unwrap();
    let pool = client.new_id(Interface::ShmPool);
    client.send(
        shm,
        wl_shm::REQ_CREATE_POOL,
        smallvec![
            Argument::NewId(pool),
            Argument::Fd(OwnedFd::from(file)),
            Argument::Int(4096)
        ],
    );
    let buffer = client.new_id(Interface::Buffer);
    client.send(
        pool,
        wl_shm_pool::REQ_CREATE_BUFFER,
        smallvec![
            Argument::NewId(buffer),
            Argument::Int(0),
            Argument::Int(16),
            Argument::Int(16),
            Argument::Int(64),
            Argument::Uint(wl_shm::FORMAT_XRGB8888),
        ],
    );
    // the pool may go away while its buffers live on
    client.send(pool, wl_shm_pool::REQ_DESTROY, smallvec![]);
    let surface = client.create_surface(compositor);
    client.send(
        surface,
        wl_surface::REQ_ATTACH,
        smallvec![Argument::Object(buffer), Argument::Int(0), Argument::Int(0)],
    );
    client.send(
        surface,
        wl_surface::REQ_DAMAGE_BUFFER,
        smallvec![Argument::Int(0), Argument::Int(0), Argument::Int(16), Argument::Int(16)],
    );
    client.send(surface, wl_surface::REQ_SET_BUFFER_SCALE, smallvec![Argument::Int(2)]);
    client.send(surface, wl_surface::REQ_COMMIT, smallvec![]);
    harness.roundtrip(&mut client);

    assert!(harness.disconnect_reason(id).is_none());
    let (_, committed, attributes) = &harness.handler.commits[0];
    assert_eq!(*committed, surface);
    assert_eq!(attributes.buffer_scale, 2);
    assert_eq!(attributes.damage.len(), 1);
    match &attributes.buffer {
        Some(BufferAssignment::NewBuffer(handle)) => {
            assert_eq!(handle.id(), buffer);
            assert_eq!((handle.width, handle.height, handle.stride), (16, 16, 64));
            assert_eq!(handle.format, wl_shm::FORMAT_XRGB8888);
            assert_eq!(handle.pool_size(), 4096);
        }
        other => panic!("unexpected buffer {:?}", other),
    }

    assert!(harness.display.release_buffer(id, buffer));
    assert!(!harness.display.release_buffer(id, surface));
    harness.display.flush_clients(&mut harness.handler);
    let events = client.read_events();
    assert_eq!(names(&events), vec!["release"]);
    assert_eq!(events[0].object, buffer);
}

#[test]
fn buffer_outside_the_pool_is_an_error() {
    let mut harness = Harness::new();
    let (a, mut client) = harness.connect();
    let registry = client.get_registry();
    let shm = client.bind(registry, 2, Interface::Shm, 1);
    let pool = client.new_id(Interface::ShmPool);
    client.send(
        shm,
        wl_shm::REQ_CREATE_POOL,
        smallvec![
            Argument::NewId(pool),
            Argument::Fd(OwnedFd::from(tempfile::tempfile().unwrap())),
            Argument::Int(1024)
        ],
    );
    let buffer = client.new_id(Interface::Buffer);
    client.send(
        pool,
        wl_shm_pool::REQ_CREATE_BUFFER,
        smallvec![
            Argument::NewId(buffer),
            Argument::Int(0),
            Argument::Int(16),
            Argument::Int(17),
            Argument::Int(64),
            Argument::Uint(wl_shm::FORMAT_ARGB8888),
        ],
    );
    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, pool, wl_shm::ERROR_INVALID_STRIDE);
    assert!(harness.display.client(a).is_none());
}

#[test]
fn invalid_scale_is_an_error() {
    let mut harness = Harness::new();
    let (_, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let surface = client.create_surface(compositor);
    client.send(surface, wl_surface::REQ_SET_BUFFER_SCALE, smallvec![Argument::Int(0)]);
    let events = harness.roundtrip(&mut client);
    assert_protocol_error(&events, surface, wl_surface::ERROR_INVALID_SCALE);
}

#[test]
fn frame_callbacks_fire_after_commit() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let surface = client.create_surface(compositor);
    let callback = client.new_id(Interface::Callback);
    client.send(surface, wl_surface::REQ_FRAME, smallvec![Argument::NewId(callback)]);
    harness.roundtrip(&mut client);

    // not committed yet
    harness.display.send_all_frame_callbacks(10);
    harness.display.flush_clients(&mut harness.handler);
    assert!(client.read_events().is_empty());

    client.send(surface, wl_surface::REQ_COMMIT, smallvec![]);
    harness.roundtrip(&mut client);
    harness.display.send_all_frame_callbacks(1234);
    harness.display.flush_clients(&mut harness.handler);
    let events = client.read_events();
    assert_eq!(names(&events), vec!["done", "delete_id"]);
    assert_eq!(events[0].object, callback);
    assert_eq!(events[0].uint(0), 1234);
    assert!(!harness.display.client(id).unwrap().objects().contains(callback));
}

#[test]
fn disconnect_destroys_everything() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let surface = client.create_surface(compositor);
    harness.roundtrip(&mut client);
    drop(client);

    assert_eq!(harness.display.dispatch_clients(&mut harness.handler), vec![id]);
    assert!(harness.handler.notes.contains(&Note::SurfaceDestroyed(surface)));
    assert_eq!(
        harness.disconnect_reason(id),
        Some(&DisconnectReason::ConnectionClosed)
    );
    assert_eq!(harness.display.clients().count(), 0);
}

#[test]
fn destroying_a_surface_unlinks_it() {
    let mut harness = Harness::new();
    let (id, mut client) = harness.connect();
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, Interface::Compositor, 4);
    let surface = client.create_surface(compositor);
    harness.roundtrip(&mut client);

    let state = harness.display.client(id).unwrap();
    assert_eq!(state.objects().get(compositor).unwrap().children(), &[surface]);
    client.send(surface, wl_surface::REQ_DESTROY, smallvec![]);
    let events = harness.roundtrip(&mut client);
    assert_eq!(names(&events), vec!["delete_id"]);
    assert!(harness.handler.notes.contains(&Note::SurfaceDestroyed(surface)));
    let state = harness.display.client(id).unwrap();
    assert!(state.objects().get(compositor).unwrap().children().is_empty());
}

#[test]
fn shutdown_disconnects_every_client() {
    let mut harness = Harness::new();
    let (a, _client_a) = harness.connect();
    let (b, _client_b) = harness.connect();
    harness.display.shutdown(&mut harness.handler);
    assert_eq!(harness.disconnect_reason(a), Some(&DisconnectReason::Shutdown));
    assert_eq!(harness.disconnect_reason(b), Some(&DisconnectReason::Shutdown));
    assert_eq!(harness.display.clients().count(), 0);
}

#[test]
fn unused_fds_disconnect_the_client() {
    let mut harness = Harness::with_config(DisplayConfig {
        max_fds_per_client: 16,
        ..Default::default()
    });
    let (a, mut client_a) = harness.connect();
    let (b, mut client_b) = harness.connect();

    // valid sync requests, each carrying a file descriptor nothing asks for
    for _ in 0..20 {
        let callback = client_a.new_id(Interface::Callback);
        let stray = OwnedFd::from(tempfile::tempfile().unwrap());
        client_a.send(
            DISPLAY_ID,
            wl_display::REQ_SYNC,
            smallvec![Argument::NewId(callback), Argument::Fd(stray)],
        );
    }
    client_a.flush();
    client_b.sync();
    client_b.flush();

    let closed = harness.display.dispatch_clients(&mut harness.handler);
    assert_eq!(closed, vec![a]);
    assert_eq!(
        harness.disconnect_reason(a),
        Some(&DisconnectReason::Io(std::io::ErrorKind::InvalidData))
    );
    assert!(harness.display.client(a).is_none());

    harness.display.flush_clients(&mut harness.handler);
    assert_eq!(names(&client_b.read_events()), vec!["done", "delete_id"]);
    assert!(harness.display.client(b).is_some());
}
