//! Per-client object table
//!
//! Objects are stored in an arena indexed by their id. Every object may have a
//! parent, and keeps the list of its children: destroying an object destroys its
//! whole subtree, children first.
//!
//! The id space is split in two ranges. Ids below [`SERVER_ID_START`] are chosen
//! by the client through `new_id` arguments, ids from [`SERVER_ID_START`] upwards
//! are allocated by the compositor. Both ranges are allocated in increasing order,
//! so an id is never handed out twice over the lifetime of the table without
//! having to remember the destroyed ones.

use std::collections::HashMap;

use crate::protocol::Interface;

/// First id of the server-allocated range
pub const SERVER_ID_START: u32 = 0xff00_0000;

/// An object stored in an [`ObjectMap`]
#[derive(Debug)]
pub struct Object<T> {
    /// Id of the object
    pub id: u32,
    /// Interface implemented by the object
    pub interface: Interface,
    /// Version of the interface the object was created with
    pub version: u32,
    /// Implementation state
    pub data: T,
    parent: Option<u32>,
    children: Vec<u32>,
}

impl<T> Object<T> {
    /// Id of the object owning this one, if any
    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    /// Ids of the objects owned by this one
    pub fn children(&self) -> &[u32] {
        &self.children
    }
}

/// The requested id cannot be used for a new object
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("id {0} cannot be used for a new object")]
pub struct InvalidId(pub u32);

/// The server id range is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the object id space is exhausted")]
pub struct IdExhausted;

/// Arena of the objects of a client
#[derive(Debug)]
pub struct ObjectMap<T> {
    objects: HashMap<u32, Object<T>>,
    // highest client id ever inserted
    last_client_id: u32,
    next_server_id: Option<u32>,
}

impl<T> Default for ObjectMap<T> {
    fn default() -> Self {
        ObjectMap {
            objects: HashMap::new(),
            last_client_id: 0,
            next_server_id: Some(SERVER_ID_START),
        }
    }
}

impl<T> ObjectMap<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding a single unowned object
    pub(crate) fn with_root(id: u32, interface: Interface, version: u32, data: T) -> Self {
        let mut map = Self::default();
        if id < SERVER_ID_START {
            map.last_client_id = id;
        }
        map.link(id, None, interface, version, data);
        map
    }

    /// Insert an object at an id chosen by the client
    ///
    /// Client ids must be increasing: this fails if the id is 0, lies in the server
    /// range, or is not above every client id inserted before.
    pub fn insert_at(
        &mut self,
        id: u32,
        parent: Option<u32>,
        interface: Interface,
        version: u32,
        data: T,
    ) -> Result<(), InvalidId> {
        if id <= self.last_client_id || id >= SERVER_ID_START {
            return Err(InvalidId(id));
        }
        self.last_client_id = id;
        self.link(id, parent, interface, version, data);
        Ok(())
    }

    /// Allocate a server-side id and insert an object at it
    pub fn allocate(
        &mut self,
        parent: Option<u32>,
        interface: Interface,
        version: u32,
        data: T,
    ) -> Result<u32, IdExhausted> {
        let id = self.next_server_id.ok_or(IdExhausted)?;
        self.next_server_id = id.checked_add(1);
        self.link(id, parent, interface, version, data);
        Ok(id)
    }

    fn link(&mut self, id: u32, parent: Option<u32>, interface: Interface, version: u32, data: T) {
        // a parent that is gone simply leaves the object unowned
        let parent = parent.filter(|p| match self.objects.get_mut(p) {
            Some(parent) => {
                parent.children.push(id);
                true
            }
            None => false,
        });
        self.objects.insert(
            id,
            Object {
                id,
                interface,
                version,
                data,
                parent,
                children: Vec::new(),
            },
        );
    }

    /// Access an object
    pub fn get(&self, id: u32) -> Option<&Object<T>> {
        self.objects.get(&id)
    }

    /// Mutably access an object
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Object<T>> {
        self.objects.get_mut(&id)
    }

    /// Whether an object with this id is alive
    pub fn contains(&self, id: u32) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over the live objects, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Object<T>> {
        self.objects.values()
    }

    /// Destroy an object and everything it owns
    ///
    /// The removed objects are returned, every child before its parent. Destroying an
    /// id that is not alive does nothing.
    pub fn destroy(&mut self, id: u32) -> Vec<Object<T>> {
        let mut removed = Vec::new();
        let Some(parent) = self.objects.get(&id).map(|obj| obj.parent) else {
            return removed;
        };
        if let Some(parent) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        self.remove_subtree(id, &mut removed);
        removed
    }

    fn remove_subtree(&mut self, id: u32, removed: &mut Vec<Object<T>>) {
        // iterative post-order traversal, client controlled trees may be deep
        let mut stack = vec![(id, false)];
        while let Some((current, visited)) = stack.pop() {
            if visited {
                if let Some(obj) = self.objects.remove(&current) {
                    removed.push(obj);
                }
                continue;
            }
            stack.push((current, true));
            if let Some(obj) = self.objects.get(&current) {
                stack.extend(obj.children.iter().rev().map(|c| (*c, false)));
            }
        }
    }

    /// Remove every object, children before their parents
    pub fn clear(&mut self) -> Vec<Object<T>> {
        let roots: Vec<u32> = self
            .objects
            .values()
            .filter(|obj| obj.parent.is_none())
            .map(|obj| obj.id)
            .collect();
        let mut removed = Vec::with_capacity(self.objects.len());
        for root in roots {
            self.remove_subtree(root, &mut removed);
        }
        removed
    }
}
