use tracing::trace;

use super::{BufferAssignment, CompositorHandler, Damage, RectangleKind, RegionAttributes, SurfaceState, Transform};
use crate::{
    protocol::{wl_compositor, wl_region, wl_surface, Interface},
    server::{
        dispatch::{unknown_request, DispatchContext, Request},
        ClientState, ObjectData, ProtocolError,
    },
    utils::Rectangle,
};

pub(crate) fn handle_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    request: Request,
) -> Result<(), ProtocolError> {
    match request.interface {
        Interface::Compositor => compositor_request(cx, request),
        Interface::Surface => surface_request(cx, request),
        Interface::Region => region_request(cx, request),
        _ => Err(unknown_request(&request)),
    }
}

fn compositor_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    match request.opcode {
        wl_compositor::REQ_CREATE_SURFACE => {
            let id = request.args.new_id()?;
            cx.client.insert_object(
                id,
                Some(request.object),
                Interface::Surface,
                request.version,
                ObjectData::Surface(SurfaceState::default()),
            )?;
            cx.handler.new_surface(cx.client.id(), id);
            Ok(())
        }
        wl_compositor::REQ_CREATE_REGION => {
            let id = request.args.new_id()?;
            cx.client.insert_object(
                id,
                Some(request.object),
                Interface::Region,
                request.version,
                ObjectData::Region(RegionAttributes::default()),
            )
        }
        _ => Err(unknown_request(&request)),
    }
}

fn surface_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    let surface = request.object;
    match request.opcode {
        wl_surface::REQ_DESTROY => {
            cx.destroy(surface);
        }
        wl_surface::REQ_ATTACH => {
            let buffer = request.args.object()?;
            let x = request.args.int()?;
            let y = request.args.int()?;
            let assignment = match buffer {
                Some(id) => match cx.client.objects.get(id).map(|obj| &obj.data) {
                    Some(ObjectData::Buffer(handle)) => BufferAssignment::NewBuffer(handle.clone()),
                    _ => return Err(ProtocolError::InvalidObject(id)),
                },
                None => BufferAssignment::Removed,
            };
            let state = surface_state(cx.client, surface)?;
            state.pending.buffer = Some(assignment);
            state.pending.buffer_delta = (x, y);
        }
        wl_surface::REQ_DAMAGE => {
            let rect = rectangle(&mut request)?;
            surface_state(cx.client, surface)?
                .pending
                .damage
                .push(Damage::Surface(rect));
        }
        wl_surface::REQ_FRAME => {
            let callback = request.args.new_id()?;
            cx.client
                .insert_object(callback, Some(surface), Interface::Callback, 1, ObjectData::Callback)?;
            surface_state(cx.client, surface)?.push_frame_callback(callback);
        }
        wl_surface::REQ_SET_OPAQUE_REGION => {
            let region = region_arg(cx.client, &mut request)?;
            surface_state(cx.client, surface)?.pending.opaque_region = region;
        }
        wl_surface::REQ_SET_INPUT_REGION => {
            let region = region_arg(cx.client, &mut request)?;
            surface_state(cx.client, surface)?.pending.input_region = region;
        }
        wl_surface::REQ_COMMIT => {
            let client = cx.client.id();
            let state = surface_state(cx.client, surface)?;
            state.commit();
            trace!(%client, surface, commit = state.commit_count(), "Surface committed");
            cx.handler.commit(client, surface, &state.current);
        }
        wl_surface::REQ_SET_BUFFER_TRANSFORM => {
            let raw = request.args.int()?;
            let transform = Transform::from_raw(raw).ok_or_else(|| ProtocolError::Interface {
                object: surface,
                interface: Interface::Surface,
                code: wl_surface::ERROR_INVALID_TRANSFORM,
                message: format!("invalid transform {}", raw),
            })?;
            surface_state(cx.client, surface)?.pending.buffer_transform = transform;
        }
        wl_surface::REQ_SET_BUFFER_SCALE => {
            let scale = request.args.int()?;
            if scale < 1 {
                return Err(ProtocolError::Interface {
                    object: surface,
                    interface: Interface::Surface,
                    code: wl_surface::ERROR_INVALID_SCALE,
                    message: format!("invalid scale {}", scale),
                });
            }
            surface_state(cx.client, surface)?.pending.buffer_scale = scale;
        }
        wl_surface::REQ_DAMAGE_BUFFER => {
            let rect = rectangle(&mut request)?;
            surface_state(cx.client, surface)?
                .pending
                .damage
                .push(Damage::Buffer(rect));
        }
        _ => return Err(unknown_request(&request)),
    }
    Ok(())
}

fn region_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    let kind = match request.opcode {
        wl_region::REQ_DESTROY => {
            cx.destroy(request.object);
            return Ok(());
        }
        wl_region::REQ_ADD => RectangleKind::Add,
        wl_region::REQ_SUBTRACT => RectangleKind::Subtract,
        _ => return Err(unknown_request(&request)),
    };
    let rect = rectangle(&mut request)?;
    match cx.client.objects.get_mut(request.object).map(|obj| &mut obj.data) {
        Some(ObjectData::Region(attributes)) => {
            attributes.rects.push((kind, rect));
            Ok(())
        }
        _ => Err(ProtocolError::InvalidObject(request.object)),
    }
}

fn surface_state(client: &mut ClientState, id: u32) -> Result<&mut SurfaceState, ProtocolError> {
    match client.objects.get_mut(id).map(|obj| &mut obj.data) {
        Some(ObjectData::Surface(state)) => Ok(state),
        _ => Err(ProtocolError::InvalidObject(id)),
    }
}

fn rectangle<Kind>(request: &mut Request) -> Result<Rectangle<Kind>, ProtocolError> {
    let x = request.args.int()?;
    let y = request.args.int()?;
    let width = request.args.int()?;
    let height = request.args.int()?;
    Ok(Rectangle::new(x, y, width, height))
}

/// Snapshot the region named by a nullable object argument
fn region_arg(client: &ClientState, request: &mut Request) -> Result<Option<RegionAttributes>, ProtocolError> {
    match request.args.object()? {
        None => Ok(None),
        Some(id) => match client.objects.get(id).map(|obj| &obj.data) {
            Some(ObjectData::Region(attributes)) => Ok(Some(attributes.clone())),
            _ => Err(ProtocolError::InvalidObject(id)),
        },
    }
}
