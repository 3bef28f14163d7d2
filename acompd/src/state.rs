use std::collections::HashMap;

use acomp::{
    compositor::{BufferAssignment, CompositorHandler, SurfaceAttributes},
    server::{ClientId, DisconnectReason},
};
use tracing::{debug, info, trace};

/// A renderer that draws nothing
///
/// Attached buffers are considered consumed as soon as they are committed and
/// are released on the next frame.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    surfaces: HashMap<(ClientId, u32), SurfaceStats>,
    pending_releases: Vec<(ClientId, u32)>,
    frames: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct SurfaceStats {
    commits: u64,
    size: Option<(i32, i32)>,
}

impl HeadlessRenderer {
    /// Buffers to release on this frame
    pub fn take_releases(&mut self) -> Vec<(ClientId, u32)> {
        self.frames += 1;
        std::mem::take(&mut self.pending_releases)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl CompositorHandler for HeadlessRenderer {
    fn client_connected(&mut self, client: ClientId) {
        debug!(%client, "Client connected");
    }

    fn client_disconnected(&mut self, client: ClientId, reason: &DisconnectReason) {
        self.surfaces.retain(|(owner, _), _| *owner != client);
        self.pending_releases.retain(|(owner, _)| *owner != client);
        info!(%client, ?reason, "Client gone");
    }

    fn new_surface(&mut self, client: ClientId, surface: u32) {
        self.surfaces.insert((client, surface), SurfaceStats::default());
    }

    fn commit(&mut self, client: ClientId, surface: u32, attributes: &SurfaceAttributes) {
        let stats = self.surfaces.entry((client, surface)).or_default();
        stats.commits += 1;
        match &attributes.buffer {
            Some(BufferAssignment::NewBuffer(buffer)) => {
                stats.size = Some((buffer.width, buffer.height));
                self.pending_releases.push((client, buffer.id()));
            }
            Some(BufferAssignment::Removed) => stats.size = None,
            None => {}
        }
        trace!(
            %client,
            surface,
            commits = stats.commits,
            size = ?stats.size,
            damage = attributes.damage.len(),
            "Surface committed"
        );
    }

    fn surface_destroyed(&mut self, client: ClientId, surface: u32) {
        self.surfaces.remove(&(client, surface));
    }

    fn buffer_destroyed(&mut self, client: ClientId, buffer: u32) {
        self.pending_releases.retain(|entry| *entry != (client, buffer));
    }
}
