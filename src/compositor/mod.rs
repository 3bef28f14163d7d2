//! Surface model and the renderer-facing handler
//!
//! This module implements the `wl_compositor`, `wl_surface` and `wl_region`
//! interfaces. It stores, for each surface, the double-buffered state described
//! by the protocol: requests modify the *pending* state, and a `commit` request
//! moves it to the *current* state, at which point your
//! [`CompositorHandler::commit`] is invoked.
//!
//! This implementation will not do anything more than present you the metadata
//! specified by the client in a coherent and practical way. All the logic
//! regarding drawing itself is out of its scope: a renderer receives the
//! committed [`SurfaceAttributes`], reads the attached [`BufferHandle`], and
//! tells the display when it is done with a buffer
//! ([`Display::release_buffer`](crate::server::Display::release_buffer)) and when
//! a frame was presented
//! ([`Display::send_frame_callbacks`](crate::server::Display::send_frame_callbacks)).

pub(crate) mod handlers;

use crate::{
    server::{ClientId, DisconnectReason},
    shm::BufferHandle,
    utils::{Buffer, Logical, Rectangle},
};

/// Description of which part of a surface
/// should be considered damaged and needs to be redrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Damage {
    /// A rectangle containing the damaged zone, in surface coordinates
    Surface(Rectangle<Logical>),
    /// A rectangle containing the damaged zone, in buffer coordinates
    ///
    /// Note: Buffer scaling must be taken into consideration
    Buffer(Rectangle<Buffer>),
}

/// New buffer assignation for a surface
#[derive(Debug, Clone)]
pub enum BufferAssignment {
    /// The surface no longer has a buffer attached to it
    Removed,
    /// A new buffer has been attached
    NewBuffer(BufferHandle),
}

/// Possible transformations to apply to a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    /// Identity transformation
    #[default]
    Normal,
    /// 90 degrees counter-clockwise
    _90,
    /// 180 degrees counter-clockwise
    _180,
    /// 270 degrees counter-clockwise
    _270,
    /// 180 degrees around a vertical axis
    Flipped,
    /// Flip and rotate 90 degrees counter-clockwise
    Flipped90,
    /// Flip and rotate 180 degrees counter-clockwise
    Flipped180,
    /// Flip and rotate 270 degrees counter-clockwise
    Flipped270,
}

impl Transform {
    /// Convert the protocol value of a transform
    pub fn from_raw(value: i32) -> Option<Transform> {
        Some(match value {
            0 => Transform::Normal,
            1 => Transform::_90,
            2 => Transform::_180,
            3 => Transform::_270,
            4 => Transform::Flipped,
            5 => Transform::Flipped90,
            6 => Transform::Flipped180,
            7 => Transform::Flipped270,
            _ => return None,
        })
    }
}

/// Kind of a rectangle part of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectangleKind {
    /// This rectangle should be added to the region
    Add,
    /// The intersection of this rectangle with the region should
    /// be removed from the region
    Subtract,
}

/// Description of the contents of a region
///
/// A region is defined as an union and difference of rectangle.
///
/// This struct contains an ordered `Vec` containing the rectangles defining
/// a region. They should be added or subtracted in this order to compute the
/// actual contents of the region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionAttributes {
    /// List of rectangle part of this region
    pub rects: Vec<(RectangleKind, Rectangle<Logical>)>,
}

impl RegionAttributes {
    /// Checks whether given point is inside the region.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let mut contains = false;
        for (kind, rect) in &self.rects {
            if rect.contains(x, y) {
                match kind {
                    RectangleKind::Add => contains = true,
                    RectangleKind::Subtract => contains = false,
                }
            }
        }
        contains
    }
}

/// Data associated with a surface
///
/// Most of the fields of this struct represent a double-buffered state, the
/// values seen by [`CompositorHandler::commit`] are the ones of the current
/// state after the commit was applied.
#[derive(Debug, Clone)]
pub struct SurfaceAttributes {
    /// Buffer defining the contents of the surface
    ///
    /// Set to `Some(...)` only on the commit where the client attached a buffer
    /// (or `NULL`), and `None` if the buffer did not change since the previous commit.
    pub buffer: Option<BufferAssignment>,
    /// Location of the new buffer relative to the previous one
    pub buffer_delta: (i32, i32),
    /// Scale of the contents of the buffer, for higher-resolution contents.
    pub buffer_scale: i32,
    /// Transform under which interpret the contents of the buffer
    pub buffer_transform: Transform,
    /// Region of the surface that is guaranteed to be opaque
    ///
    /// By default the whole surface is potentially transparent
    pub opaque_region: Option<RegionAttributes>,
    /// Region of the surface that is sensitive to user input
    ///
    /// By default the whole surface should be sensitive
    pub input_region: Option<RegionAttributes>,
    /// Damage accumulated by the client for this commit
    pub damage: Vec<Damage>,
}

impl Default for SurfaceAttributes {
    fn default() -> SurfaceAttributes {
        SurfaceAttributes {
            buffer: None,
            buffer_delta: (0, 0),
            buffer_scale: 1,
            buffer_transform: Transform::Normal,
            opaque_region: None,
            input_region: None,
            damage: Vec::new(),
        }
    }
}

/// Per-surface storage, attached to `wl_surface` objects
#[derive(Debug, Default)]
pub struct SurfaceState {
    pub(crate) pending: SurfaceAttributes,
    pub(crate) current: SurfaceAttributes,
    pending_frames: Vec<u32>,
    pub(crate) frame_callbacks: Vec<u32>,
    commits: u64,
}

impl SurfaceState {
    /// State as of the last commit
    pub fn current(&self) -> &SurfaceAttributes {
        &self.current
    }

    /// Frame callbacks committed and not yet fired
    pub fn frame_callbacks(&self) -> &[u32] {
        &self.frame_callbacks
    }

    /// Number of commits applied so far
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub(crate) fn push_frame_callback(&mut self, callback: u32) {
        self.pending_frames.push(callback);
    }

    /// Move the pending state into the current state
    pub(crate) fn commit(&mut self) {
        let pending = &mut self.pending;
        let current = &mut self.current;
        current.buffer = pending.buffer.take();
        current.buffer_delta = std::mem::take(&mut pending.buffer_delta);
        current.damage = std::mem::take(&mut pending.damage);
        current.buffer_scale = pending.buffer_scale;
        current.buffer_transform = pending.buffer_transform;
        current.opaque_region.clone_from(&pending.opaque_region);
        current.input_region.clone_from(&pending.input_region);
        self.frame_callbacks.append(&mut self.pending_frames);
        self.commits += 1;
    }
}

/// Handler receiving the notifications of the compositor core
///
/// This is the interface between the protocol core and the rest of the
/// compositor (renderer, window management). Every method but
/// [`commit`](CompositorHandler::commit) has an empty default implementation.
pub trait CompositorHandler {
    /// A new client connected
    fn client_connected(&mut self, _client: ClientId) {}

    /// A client was disconnected, all its objects are already destroyed
    fn client_disconnected(&mut self, _client: ClientId, _reason: &DisconnectReason) {}

    /// A new surface was created
    fn new_surface(&mut self, _client: ClientId, _surface: u32) {}

    /// A surface has committed new state
    fn commit(&mut self, client: ClientId, surface: u32, attributes: &SurfaceAttributes);

    /// A surface was destroyed
    fn surface_destroyed(&mut self, _client: ClientId, _surface: u32) {}

    /// A buffer was destroyed, its contents must no longer be accessed
    fn buffer_destroyed(&mut self, _client: ClientId, _buffer: u32) {}
}

impl CompositorHandler for () {
    fn commit(&mut self, _client: ClientId, _surface: u32, _attributes: &SurfaceAttributes) {}
}
