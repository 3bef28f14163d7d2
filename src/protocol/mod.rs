//! Catalog of the interfaces understood by the compositor
//!
//! Each interface is described by its name, the highest version the compositor
//! implements, and the signature of every request and event, indexed by opcode.
//! The submodules named after the interfaces hold the opcode and error code
//! constants used by the handlers.
//!
//! The catalog is a subset of the core Wayland protocol: enough for clients to
//! discover globals, create surfaces and regions, and submit shared-memory buffers.

use crate::wire::{AllowNull, ArgumentType};

/// An interface tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// `wl_display`, the implicit root object
    Display,
    /// `wl_registry`, receives global announcements
    Registry,
    /// `wl_callback`, a one-shot notification
    Callback,
    /// `wl_compositor`, the surface factory
    Compositor,
    /// `wl_surface`
    Surface,
    /// `wl_region`
    Region,
    /// `wl_shm`, the shared memory pool factory
    Shm,
    /// `wl_shm_pool`
    ShmPool,
    /// `wl_buffer`
    Buffer,
}

/// Description of a request or an event
#[derive(Debug)]
pub struct MessageDesc {
    /// Name of the message
    pub name: &'static str,
    /// Version of the interface the message first appeared in
    pub since: u32,
    /// Argument types
    pub signature: &'static [ArgumentType],
    /// Interface of the object created through the `new_id` argument, if typed
    pub child: Option<Interface>,
    /// Whether the message destroys the object it is sent to
    pub destructor: bool,
}

const fn msg(name: &'static str, since: u32, signature: &'static [ArgumentType]) -> MessageDesc {
    MessageDesc {
        name,
        since,
        signature,
        child: None,
        destructor: false,
    }
}

const fn creator(
    name: &'static str,
    since: u32,
    signature: &'static [ArgumentType],
    child: Interface,
) -> MessageDesc {
    MessageDesc {
        name,
        since,
        signature,
        child: Some(child),
        destructor: false,
    }
}

const fn destructor(name: &'static str, since: u32) -> MessageDesc {
    MessageDesc {
        name,
        since,
        signature: &[],
        child: None,
        destructor: true,
    }
}

use ArgumentType::{Fd, Int, NewId, Uint};
const OBJECT: ArgumentType = ArgumentType::Object(AllowNull::No);
const OPT_OBJECT: ArgumentType = ArgumentType::Object(AllowNull::Yes);
const STRING: ArgumentType = ArgumentType::Str(AllowNull::No);

impl Interface {
    /// Every interface of the catalog
    pub const ALL: [Interface; 9] = [
        Interface::Display,
        Interface::Registry,
        Interface::Callback,
        Interface::Compositor,
        Interface::Surface,
        Interface::Region,
        Interface::Shm,
        Interface::ShmPool,
        Interface::Buffer,
    ];

    /// The protocol name of the interface
    pub fn name(self) -> &'static str {
        match self {
            Interface::Display => "wl_display",
            Interface::Registry => "wl_registry",
            Interface::Callback => "wl_callback",
            Interface::Compositor => "wl_compositor",
            Interface::Surface => "wl_surface",
            Interface::Region => "wl_region",
            Interface::Shm => "wl_shm",
            Interface::ShmPool => "wl_shm_pool",
            Interface::Buffer => "wl_buffer",
        }
    }

    /// Look an interface up by its protocol name
    pub fn from_name(name: &str) -> Option<Interface> {
        Interface::ALL.into_iter().find(|i| i.name() == name)
    }

    /// The highest version of the interface implemented here
    pub fn version(self) -> u32 {
        match self {
            Interface::Compositor | Interface::Surface => 4,
            _ => 1,
        }
    }

    /// Whether the interface can be advertised as a global
    pub fn is_global(self) -> bool {
        matches!(self, Interface::Compositor | Interface::Shm)
    }

    /// Requests of the interface, indexed by opcode
    pub fn requests(self) -> &'static [MessageDesc] {
        match self {
            Interface::Display => wl_display::REQUESTS,
            Interface::Registry => wl_registry::REQUESTS,
            Interface::Callback => &[],
            Interface::Compositor => wl_compositor::REQUESTS,
            Interface::Surface => wl_surface::REQUESTS,
            Interface::Region => wl_region::REQUESTS,
            Interface::Shm => wl_shm::REQUESTS,
            Interface::ShmPool => wl_shm_pool::REQUESTS,
            Interface::Buffer => wl_buffer::REQUESTS,
        }
    }

    /// Events of the interface, indexed by opcode
    pub fn events(self) -> &'static [MessageDesc] {
        match self {
            Interface::Display => wl_display::EVENTS,
            Interface::Registry => wl_registry::EVENTS,
            Interface::Callback => wl_callback::EVENTS,
            Interface::Compositor | Interface::Region | Interface::ShmPool => &[],
            Interface::Surface => wl_surface::EVENTS,
            Interface::Shm => wl_shm::EVENTS,
            Interface::Buffer => wl_buffer::EVENTS,
        }
    }

    /// The request with the given opcode, if it exists at `version`
    pub fn request(self, opcode: u16, version: u32) -> Option<&'static MessageDesc> {
        self.requests()
            .get(opcode as usize)
            .filter(|desc| desc.since <= version)
    }

    /// The event with the given opcode
    pub fn event(self, opcode: u16) -> Option<&'static MessageDesc> {
        self.events().get(opcode as usize)
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `wl_display`
pub mod wl_display {
    use super::*;

    /// `sync(callback: new_id<wl_callback>)`
    pub const REQ_SYNC: u16 = 0;
    /// `get_registry(registry: new_id<wl_registry>)`
    pub const REQ_GET_REGISTRY: u16 = 1;

    /// `error(object_id: object, code: uint, message: string)`
    pub const EVT_ERROR: u16 = 0;
    /// `delete_id(id: uint)`
    pub const EVT_DELETE_ID: u16 = 1;

    /// Server couldn't find object
    pub const ERROR_INVALID_OBJECT: u32 = 0;
    /// Method doesn't exist on the specified interface or malformed request
    pub const ERROR_INVALID_METHOD: u32 = 1;
    /// Server is out of memory
    pub const ERROR_NO_MEMORY: u32 = 2;
    /// Implementation error in the compositor
    pub const ERROR_IMPLEMENTATION: u32 = 3;

    pub(super) const REQUESTS: &[MessageDesc] = &[
        creator("sync", 1, &[NewId], Interface::Callback),
        creator("get_registry", 1, &[NewId], Interface::Registry),
    ];
    pub(super) const EVENTS: &[MessageDesc] = &[
        msg("error", 1, &[OBJECT, Uint, STRING]),
        msg("delete_id", 1, &[Uint]),
    ];
}

/// `wl_registry`
pub mod wl_registry {
    use super::*;

    /// `bind(name: uint, id: new_id)`, the untyped new_id is sent as interface, version, id
    pub const REQ_BIND: u16 = 0;

    /// `global(name: uint, interface: string, version: uint)`
    pub const EVT_GLOBAL: u16 = 0;
    /// `global_remove(name: uint)`
    pub const EVT_GLOBAL_REMOVE: u16 = 1;

    pub(super) const REQUESTS: &[MessageDesc] = &[msg("bind", 1, &[Uint, STRING, Uint, NewId])];
    pub(super) const EVENTS: &[MessageDesc] =
        &[msg("global", 1, &[Uint, STRING, Uint]), msg("global_remove", 1, &[Uint])];
}

/// `wl_callback`
pub mod wl_callback {
    use super::*;

    /// `done(callback_data: uint)`, destroys the callback
    pub const EVT_DONE: u16 = 0;

    pub(super) const EVENTS: &[MessageDesc] = &[MessageDesc {
        name: "done",
        since: 1,
        signature: &[Uint],
        child: None,
        destructor: true,
    }];
}

/// `wl_compositor`
pub mod wl_compositor {
    use super::*;

    /// `create_surface(id: new_id<wl_surface>)`
    pub const REQ_CREATE_SURFACE: u16 = 0;
    /// `create_region(id: new_id<wl_region>)`
    pub const REQ_CREATE_REGION: u16 = 1;

    pub(super) const REQUESTS: &[MessageDesc] = &[
        creator("create_surface", 1, &[NewId], Interface::Surface),
        creator("create_region", 1, &[NewId], Interface::Region),
    ];
}

/// `wl_surface`
pub mod wl_surface {
    use super::*;

    /// `destroy()`
    pub const REQ_DESTROY: u16 = 0;
    /// `attach(buffer: object<wl_buffer>?, x: int, y: int)`
    pub const REQ_ATTACH: u16 = 1;
    /// `damage(x: int, y: int, width: int, height: int)`
    pub const REQ_DAMAGE: u16 = 2;
    /// `frame(callback: new_id<wl_callback>)`
    pub const REQ_FRAME: u16 = 3;
    /// `set_opaque_region(region: object<wl_region>?)`
    pub const REQ_SET_OPAQUE_REGION: u16 = 4;
    /// `set_input_region(region: object<wl_region>?)`
    pub const REQ_SET_INPUT_REGION: u16 = 5;
    /// `commit()`
    pub const REQ_COMMIT: u16 = 6;
    /// `set_buffer_transform(transform: int)`
    pub const REQ_SET_BUFFER_TRANSFORM: u16 = 7;
    /// `set_buffer_scale(scale: int)`
    pub const REQ_SET_BUFFER_SCALE: u16 = 8;
    /// `damage_buffer(x: int, y: int, width: int, height: int)`
    pub const REQ_DAMAGE_BUFFER: u16 = 9;

    /// Buffer scale value is invalid
    pub const ERROR_INVALID_SCALE: u32 = 0;
    /// Buffer transform value is invalid
    pub const ERROR_INVALID_TRANSFORM: u32 = 1;

    pub(super) const REQUESTS: &[MessageDesc] = &[
        destructor("destroy", 1),
        msg("attach", 1, &[OPT_OBJECT, Int, Int]),
        msg("damage", 1, &[Int, Int, Int, Int]),
        creator("frame", 1, &[NewId], Interface::Callback),
        msg("set_opaque_region", 1, &[OPT_OBJECT]),
        msg("set_input_region", 1, &[OPT_OBJECT]),
        msg("commit", 1, &[]),
        msg("set_buffer_transform", 2, &[Int]),
        msg("set_buffer_scale", 3, &[Int]),
        msg("damage_buffer", 4, &[Int, Int, Int, Int]),
    ];
    // enter and leave reference outputs, which this compositor does not expose
    pub(super) const EVENTS: &[MessageDesc] = &[msg("enter", 1, &[OBJECT]), msg("leave", 1, &[OBJECT])];
}

/// `wl_region`
pub mod wl_region {
    use super::*;

    /// `destroy()`
    pub const REQ_DESTROY: u16 = 0;
    /// `add(x: int, y: int, width: int, height: int)`
    pub const REQ_ADD: u16 = 1;
    /// `subtract(x: int, y: int, width: int, height: int)`
    pub const REQ_SUBTRACT: u16 = 2;

    pub(super) const REQUESTS: &[MessageDesc] = &[
        destructor("destroy", 1),
        msg("add", 1, &[Int, Int, Int, Int]),
        msg("subtract", 1, &[Int, Int, Int, Int]),
    ];
}

/// `wl_shm`
pub mod wl_shm {
    use super::*;

    /// `create_pool(id: new_id<wl_shm_pool>, fd: fd, size: int)`
    pub const REQ_CREATE_POOL: u16 = 0;

    /// `format(format: uint)`
    pub const EVT_FORMAT: u16 = 0;

    /// Buffer format is not known
    pub const ERROR_INVALID_FORMAT: u32 = 0;
    /// Invalid size or stride during pool or buffer creation
    pub const ERROR_INVALID_STRIDE: u32 = 1;
    /// Mmapping the file descriptor failed
    pub const ERROR_INVALID_FD: u32 = 2;

    /// 32-bit ARGB format, always supported
    pub const FORMAT_ARGB8888: u32 = 0;
    /// 32-bit RGB format, always supported
    pub const FORMAT_XRGB8888: u32 = 1;

    pub(super) const REQUESTS: &[MessageDesc] =
        &[creator("create_pool", 1, &[NewId, Fd, Int], Interface::ShmPool)];
    pub(super) const EVENTS: &[MessageDesc] = &[msg("format", 1, &[Uint])];
}

/// `wl_shm_pool`
pub mod wl_shm_pool {
    use super::*;

    /// `create_buffer(id: new_id<wl_buffer>, offset: int, width: int, height: int, stride: int, format: uint)`
    pub const REQ_CREATE_BUFFER: u16 = 0;
    /// `destroy()`
    pub const REQ_DESTROY: u16 = 1;
    /// `resize(size: int)`
    pub const REQ_RESIZE: u16 = 2;

    pub(super) const REQUESTS: &[MessageDesc] = &[
        creator(
            "create_buffer",
            1,
            &[NewId, Int, Int, Int, Int, Uint],
            Interface::Buffer,
        ),
        destructor("destroy", 1),
        msg("resize", 1, &[Int]),
    ];
}

/// `wl_buffer`
pub mod wl_buffer {
    use super::*;

    /// `destroy()`
    pub const REQ_DESTROY: u16 = 0;

    /// `release()`
    pub const EVT_RELEASE: u16 = 0;

    pub(super) const REQUESTS: &[MessageDesc] = &[destructor("destroy", 1)];
    pub(super) const EVENTS: &[MessageDesc] = &[msg("release", 1, &[])];
}
