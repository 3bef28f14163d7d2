use std::{collections::VecDeque, os::unix::io::OwnedFd};

use smallvec::{smallvec, SmallVec};
use tracing::trace;

use super::{ClientId, Object, ObjectMap, ProtocolError, DISPLAY_ID};
use crate::{
    compositor::{CompositorHandler, RegionAttributes, SurfaceState},
    protocol::{wl_callback, wl_display, Interface},
    shm::{BufferHandle, ShmPool},
    wire::{Argument, Message},
};

/// Implementation state of a protocol object, one variant per interface
#[derive(Debug)]
pub enum ObjectData {
    /// `wl_display`
    Display,
    /// `wl_registry`
    Registry,
    /// `wl_callback`
    Callback,
    /// `wl_compositor`
    Compositor,
    /// `wl_surface`
    Surface(SurfaceState),
    /// `wl_region`
    Region(RegionAttributes),
    /// `wl_shm`
    Shm,
    /// `wl_shm_pool`
    ShmPool(ShmPool),
    /// `wl_buffer`
    Buffer(BufferHandle),
}

/// Protocol state of a client: its objects and its queue of outgoing events
#[derive(Debug)]
pub struct ClientState {
    id: ClientId,
    pub(crate) objects: ObjectMap<ObjectData>,
    outgoing: VecDeque<Message<OwnedFd>>,
}

impl ClientState {
    pub(crate) fn new(id: ClientId) -> ClientState {
        ClientState {
            id,
            objects: ObjectMap::with_root(DISPLAY_ID, Interface::Display, 1, ObjectData::Display),
            outgoing: VecDeque::new(),
        }
    }

    /// Id of the client
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The objects of the client
    pub fn objects(&self) -> &ObjectMap<ObjectData> {
        &self.objects
    }

    /// Number of events waiting to be written
    pub fn pending_events(&self) -> usize {
        self.outgoing.len()
    }

    /// Create an object at an id chosen by the client
    pub(crate) fn insert_object(
        &mut self,
        id: u32,
        parent: Option<u32>,
        interface: Interface,
        version: u32,
        data: ObjectData,
    ) -> Result<(), ProtocolError> {
        self.objects.insert_at(id, parent, interface, version, data)?;
        trace!(client = ?self.id, object = id, %interface, version, "Created object");
        Ok(())
    }

    /// Queue an event, unless its target object is already gone
    pub(crate) fn send_event(&mut self, sender_id: u32, opcode: u16, args: SmallVec<[Argument<OwnedFd>; 4]>) {
        if !self.objects.contains(sender_id) {
            trace!(client = ?self.id, object = sender_id, opcode, "Dropping event to a dead object");
            return;
        }
        self.outgoing.push_back(Message {
            sender_id,
            opcode,
            args,
        });
    }

    pub(crate) fn take_outgoing(&mut self) -> VecDeque<Message<OwnedFd>> {
        std::mem::take(&mut self.outgoing)
    }

    /// Destroy an object and the objects it owns
    ///
    /// The client is sent a `delete_id` event for every destroyed id it allocated.
    /// The removed objects are returned children first.
    pub(crate) fn destroy_object(&mut self, id: u32) -> Vec<Object<ObjectData>> {
        let removed = self.objects.destroy(id);
        for object in &removed {
            if object.id < super::SERVER_ID_START {
                self.send_event(
                    DISPLAY_ID,
                    wl_display::EVT_DELETE_ID,
                    smallvec![Argument::Uint(object.id)],
                );
            }
        }
        removed
    }

    /// Send `wl_callback.done` and destroy the callback
    pub(crate) fn fire_callback(&mut self, callback: u32, data: u32) {
        self.send_event(callback, wl_callback::EVT_DONE, smallvec![Argument::Uint(data)]);
        self.destroy_object(callback);
    }

    /// Destroy every object, without notifying the client
    pub(crate) fn clear<H: CompositorHandler>(&mut self, handler: &mut H) {
        let removed = self.objects.clear();
        notify_destroyed(handler, self.id, &removed);
        self.outgoing.clear();
    }

    /// Ids of the registry objects of this client
    pub(crate) fn registries(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .objects
            .iter()
            .filter(|obj| obj.interface == Interface::Registry)
            .map(|obj| obj.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

pub(crate) fn notify_destroyed<H: CompositorHandler>(handler: &mut H, client: ClientId, objects: &[Object<ObjectData>]) {
    for object in objects {
        match object.data {
            ObjectData::Surface(_) => handler.surface_destroyed(client, object.id),
            ObjectData::Buffer(_) => handler.buffer_destroyed(client, object.id),
            _ => {}
        }
    }
}
