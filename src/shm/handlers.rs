use tracing::debug;

use super::{LayoutError, ShmPool, MANDATORY_FORMATS};
use crate::{
    compositor::CompositorHandler,
    protocol::{wl_buffer, wl_shm, wl_shm_pool, Interface},
    server::{
        dispatch::{unknown_request, DispatchContext, Request},
        ObjectData, ProtocolError,
    },
};

pub(crate) fn handle_request<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    request: Request,
) -> Result<(), ProtocolError> {
    match (request.interface, request.opcode) {
        (Interface::Shm, wl_shm::REQ_CREATE_POOL) => create_pool(cx, request),
        (Interface::ShmPool, wl_shm_pool::REQ_CREATE_BUFFER) => create_buffer(cx, request),
        (Interface::ShmPool, wl_shm_pool::REQ_RESIZE) => resize_pool(cx, request),
        (Interface::ShmPool, wl_shm_pool::REQ_DESTROY) | (Interface::Buffer, wl_buffer::REQ_DESTROY) => {
            cx.destroy(request.object);
            Ok(())
        }
        _ => Err(unknown_request(&request)),
    }
}

fn layout_error(object: u32, interface: Interface, err: LayoutError) -> ProtocolError {
    ProtocolError::Interface {
        object,
        interface,
        code: wl_shm::ERROR_INVALID_STRIDE,
        message: err.to_string(),
    }
}

fn create_pool<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    let id = request.args.new_id()?;
    let fd = request.args.fd()?;
    let size = request.args.int()?;
    let pool = ShmPool::new(fd, size).map_err(|err| layout_error(request.object, Interface::Shm, err))?;
    cx.client
        .insert_object(id, None, Interface::ShmPool, request.version, ObjectData::ShmPool(pool))?;
    debug!(client = %cx.client.id(), pool = id, size, "Created shm pool");
    Ok(())
}

fn create_buffer<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    let pool_id = request.object;
    let id = request.args.new_id()?;
    let offset = request.args.int()?;
    let width = request.args.int()?;
    let height = request.args.int()?;
    let stride = request.args.int()?;
    let format = request.args.uint()?;

    if !MANDATORY_FORMATS.contains(&format) && !cx.config.shm_formats.contains(&format) {
        return Err(ProtocolError::Interface {
            object: pool_id,
            interface: Interface::ShmPool,
            code: wl_shm::ERROR_INVALID_FORMAT,
            message: format!("format {:#x} is not supported", format),
        });
    }

    let handle = match cx.client.objects.get(pool_id).map(|obj| &obj.data) {
        Some(ObjectData::ShmPool(pool)) => pool
            .buffer(id, offset, width, height, stride, format)
            .map_err(|err| layout_error(pool_id, Interface::ShmPool, err))?,
        _ => return Err(ProtocolError::InvalidObject(pool_id)),
    };
    cx.client
        .insert_object(id, None, Interface::Buffer, 1, ObjectData::Buffer(handle))
}

fn resize_pool<H: CompositorHandler>(
    cx: &mut DispatchContext<'_, H>,
    mut request: Request,
) -> Result<(), ProtocolError> {
    let size = request.args.int()?;
    match cx.client.objects.get(request.object).map(|obj| &obj.data) {
        Some(ObjectData::ShmPool(pool)) => pool
            .resize(size)
            .map_err(|err| layout_error(request.object, Interface::ShmPool, err)),
        _ => Err(ProtocolError::InvalidObject(request.object)),
    }
}
