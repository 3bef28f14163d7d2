//! Routing of decoded requests to the handler of their target interface
//!
//! The bytes received from a client are decoded lazily, one frame at a time, and
//! each frame is dispatched before the next one is decoded: a request may use an
//! object created by the request right before it in the same read.

use std::{collections::VecDeque, os::unix::io::OwnedFd};

use smallvec::smallvec;
use tracing::{debug, trace};

use super::{
    client::notify_destroyed, ClientState, DisplayConfig, GlobalRegistry, ObjectData, ProtocolError, DISPLAY_ID,
};
use crate::{
    compositor::{self, CompositorHandler},
    protocol::{wl_display, wl_registry, wl_shm, Interface},
    shm::{self, MANDATORY_FORMATS},
    utils::SerialCounter,
    wire::{self, Argument, Message, MessageParseError},
};

/// Everything a request handler may touch
pub(crate) struct DispatchContext<'a, H> {
    pub(crate) client: &'a mut ClientState,
    pub(crate) globals: &'a GlobalRegistry,
    pub(crate) serials: &'a mut SerialCounter,
    pub(crate) config: &'a DisplayConfig,
    pub(crate) handler: &'a mut H,
}

impl<H: CompositorHandler> DispatchContext<'_, H> {
    /// Destroy an object of the client, telling the handler about destroyed surfaces and buffers
    pub(crate) fn destroy(&mut self, id: u32) {
        let removed = self.client.destroy_object(id);
        notify_destroyed(&mut *self.handler, self.client.id(), &removed);
    }
}

/// A decoded request, along with what is known of its target
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) object: u32,
    pub(crate) interface: Interface,
    pub(crate) version: u32,
    pub(crate) opcode: u16,
    pub(crate) args: Args,
}

/// Typed access to the arguments of a request, in signature order
#[derive(Debug)]
pub(crate) struct Args {
    object: u32,
    index: usize,
    args: smallvec::IntoIter<[Argument<OwnedFd>; 4]>,
}

impl Args {
    fn new(message: Message<OwnedFd>) -> Args {
        Args {
            object: message.sender_id,
            index: 0,
            args: message.args.into_iter(),
        }
    }

    fn mismatch(&self) -> ProtocolError {
        ProtocolError::Malformed {
            object: self.object,
            error: MessageParseError::UnexpectedArgument { index: self.index },
        }
    }

    fn next(&mut self) -> Result<Argument<OwnedFd>, ProtocolError> {
        let arg = self.args.next().ok_or_else(|| self.mismatch())?;
        self.index += 1;
        Ok(arg)
    }

    pub(crate) fn int(&mut self) -> Result<i32, ProtocolError> {
        match self.next()? {
            Argument::Int(v) => Ok(v),
            _ => Err(self.mismatch()),
        }
    }

    pub(crate) fn uint(&mut self) -> Result<u32, ProtocolError> {
        match self.next()? {
            Argument::Uint(v) => Ok(v),
            _ => Err(self.mismatch()),
        }
    }

    /// An object argument, `None` if null
    pub(crate) fn object(&mut self) -> Result<Option<u32>, ProtocolError> {
        match self.next()? {
            Argument::Object(0) => Ok(None),
            Argument::Object(id) => Ok(Some(id)),
            _ => Err(self.mismatch()),
        }
    }

    pub(crate) fn new_id(&mut self) -> Result<u32, ProtocolError> {
        match self.next()? {
            Argument::NewId(id) => Ok(id),
            _ => Err(self.mismatch()),
        }
    }

    pub(crate) fn string(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.next()? {
            Argument::Str(s) => Ok(s),
            _ => Err(self.mismatch()),
        }
    }

    pub(crate) fn fd(&mut self) -> Result<OwnedFd, ProtocolError> {
        match self.next()? {
            Argument::Fd(fd) => Ok(fd),
            _ => Err(self.mismatch()),
        }
    }
}

/// Decode and dispatch every complete frame at the start of `data`
///
/// Returns the number of bytes consumed. A trailing partial frame is left in place,
/// along with the file descriptors it may need.
pub(crate) fn dispatch_buffer<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    data: &[u8],
    fds: &mut VecDeque<OwnedFd>,
) -> Result<usize, ProtocolError> {
    let mut consumed = 0;
    loop {
        let rest = &data[consumed..];
        let header = match wire::parse_header(rest) {
            Ok(header) => header,
            Err(MessageParseError::Incomplete) => break,
            Err(error) => {
                return Err(ProtocolError::Malformed {
                    object: DISPLAY_ID,
                    error,
                })
            }
        };

        let object = header.object_id;
        let (interface, version) = match cx.client.objects.get(object) {
            Some(obj) => (obj.interface, obj.version),
            None => return Err(ProtocolError::InvalidObject(object)),
        };
        let desc =
            interface
                .request(header.opcode, version)
                .ok_or(ProtocolError::UnknownRequest {
                    object,
                    interface,
                    opcode: header.opcode,
                })?;

        let (message, used) = match wire::decode(rest, fds, desc.signature, cx.config.max_message_size) {
            Ok(res) => res,
            Err(MessageParseError::Incomplete) => break,
            Err(error) => return Err(ProtocolError::Malformed { object, error }),
        };
        consumed += used;

        for arg in &message.args {
            if let Argument::Object(id) = *arg {
                if id != 0 && !cx.client.objects.contains(id) {
                    return Err(ProtocolError::InvalidObject(id));
                }
            }
        }

        trace!(client = %cx.client.id(), "-> {}@{}.{}", interface, object, desc.name);
        let request = Request {
            object,
            interface,
            version,
            opcode: header.opcode,
            args: Args::new(message),
        };
        dispatch(cx, request)?;
    }
    Ok(consumed)
}

fn dispatch<H: CompositorHandler>(cx: &mut DispatchContext<'_, H>, request: Request) -> Result<(), ProtocolError> {
    match request.interface {
        Interface::Display => display_request(cx, request),
        Interface::Registry => registry_request(cx, request),
        Interface::Compositor | Interface::Surface | Interface::Region => {
            compositor::handlers::handle_request(cx, request)
        }
        Interface::Shm | Interface::ShmPool | Interface::Buffer => shm::handlers::handle_request(cx, request),
        Interface::Callback => Err(unknown_request(&request)),
    }
}

pub(crate) fn unknown_request(request: &Request) -> ProtocolError {
    ProtocolError::UnknownRequest {
        object: request.object,
        interface: request.interface,
        opcode: request.opcode,
    }
}

fn display_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    match request.opcode {
        wl_display::REQ_SYNC => {
            let callback = request.args.new_id()?;
            cx.client
                .insert_object(callback, Some(DISPLAY_ID), Interface::Callback, 1, ObjectData::Callback)?;
            let serial = cx.serials.next_serial();
            cx.client.fire_callback(callback, serial.into());
            Ok(())
        }
        wl_display::REQ_GET_REGISTRY => {
            let registry = request.args.new_id()?;
            cx.client
                .insert_object(registry, None, Interface::Registry, 1, ObjectData::Registry)?;
            for global in cx.globals.iter() {
                cx.client.send_event(
                    registry,
                    wl_registry::EVT_GLOBAL,
                    smallvec![
                        Argument::Uint(global.name),
                        Argument::Str(Some(global.interface.name().into())),
                        Argument::Uint(global.version),
                    ],
                );
            }
            Ok(())
        }
        _ => Err(unknown_request(&request)),
    }
}

fn registry_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    if request.opcode != wl_registry::REQ_BIND {
        return Err(unknown_request(&request));
    }
    let name = request.args.uint()?;
    let interface = request.args.string()?.unwrap_or_default();
    let version = request.args.uint()?;
    let id = request.args.new_id()?;

    let global = *cx.globals.get(name).ok_or(ProtocolError::UnknownGlobal(name))?;
    if interface != global.interface.name() {
        return Err(ProtocolError::InvalidBind {
            name,
            reason: format!("interface {} does not match {}", interface, global.interface),
        });
    }
    if version == 0 || version > global.version {
        return Err(ProtocolError::InvalidBind {
            name,
            reason: format!(
                "version {} of {} is not available, the global offers {}",
                version, interface, global.version
            ),
        });
    }

    let data = match global.interface {
        Interface::Compositor => ObjectData::Compositor,
        Interface::Shm => ObjectData::Shm,
        other => {
            return Err(ProtocolError::InvalidBind {
                name,
                reason: format!("{} is not bindable", other),
            })
        }
    };
    cx.client.insert_object(id, None, global.interface, version, data)?;
    debug!(client = %cx.client.id(), global = name, interface = %global.interface, version, "Global bound");

    if global.interface == Interface::Shm {
        let extra = cx
            .config
            .shm_formats
            .iter()
            .filter(|format| !MANDATORY_FORMATS.contains(format));
        for &format in MANDATORY_FORMATS.iter().chain(extra) {
            cx.client
                .send_event(id, wl_shm::EVT_FORMAT, smallvec![Argument::Uint(format)]);
        }
    }
    Ok(())
}
