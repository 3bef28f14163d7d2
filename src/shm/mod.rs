//! SHM handling helpers
//!
//! SHM (Shared Memory) is the most basic way clients can send content to the
//! compositor: by sending a file descriptor to some (likely RAM-backed) storage
//! containing the actual data. The client creates a pool from the descriptor
//! through the `wl_shm` global, then carves buffers out of it.
//!
//! The core does not map the memory. It validates the buffer layout against the
//! pool size and hands the renderer a [`BufferHandle`] describing where the
//! pixels live. Buffers keep their pool alive: a client may destroy the
//! `wl_shm_pool` object while its buffers are still in use.

pub(crate) mod handlers;

use std::{
    cell::Cell,
    os::unix::io::{AsFd, BorrowedFd, OwnedFd},
    rc::Rc,
};

use crate::protocol::wl_shm;

#[derive(Debug)]
struct PoolMemory {
    fd: OwnedFd,
    size: Cell<i32>,
}

/// State of a `wl_shm_pool` object
#[derive(Debug)]
pub struct ShmPool {
    memory: Rc<PoolMemory>,
}

/// Errors in the layout of a buffer or a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The pool size is not positive
    #[error("invalid pool size {0}")]
    InvalidSize(i32),
    /// Pools may only grow
    #[error("shrinking pool from {old} to {new} bytes")]
    Shrink {
        /// Current size
        old: i32,
        /// Requested size
        new: i32,
    },
    /// The buffer does not fit the pool, or its dimensions are invalid
    #[error("invalid width, height or stride ({width}x{height}, stride {stride})")]
    InvalidStride {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
        /// Requested stride
        stride: i32,
    },
}

impl ShmPool {
    /// Wrap a client provided file descriptor of `size` bytes
    pub(crate) fn new(fd: OwnedFd, size: i32) -> Result<ShmPool, LayoutError> {
        if size <= 0 {
            return Err(LayoutError::InvalidSize(size));
        }
        Ok(ShmPool {
            memory: Rc::new(PoolMemory {
                fd,
                size: Cell::new(size),
            }),
        })
    }

    /// Current size of the pool
    pub fn size(&self) -> i32 {
        self.memory.size.get()
    }

    pub(crate) fn resize(&self, size: i32) -> Result<(), LayoutError> {
        let old = self.size();
        if size < old {
            return Err(LayoutError::Shrink { old, new: size });
        }
        self.memory.size.set(size);
        Ok(())
    }

    /// Describe a buffer of this pool, checking it lies within the pool
    pub(crate) fn buffer(
        &self,
        id: u32,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    ) -> Result<BufferHandle, LayoutError> {
        let invalid = LayoutError::InvalidStride { width, height, stride };
        if offset < 0 || width <= 0 || height <= 0 || stride < width {
            return Err(invalid);
        }
        let end = offset as i64 + stride as i64 * height as i64;
        if end > self.size() as i64 {
            return Err(invalid);
        }
        Ok(BufferHandle {
            id,
            memory: self.memory.clone(),
            offset,
            width,
            height,
            stride,
            format,
        })
    }
}

/// Description of the contents of a `wl_buffer`
///
/// This is the opaque handle given to the renderer: it identifies the memory
/// backing the buffer and the layout of the pixels inside of it.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    id: u32,
    memory: Rc<PoolMemory>,
    /// Offset of the first pixel in the pool, in bytes
    pub offset: i32,
    /// Width of the buffer, in pixels
    pub width: i32,
    /// Height of the buffer, in pixels
    pub height: i32,
    /// Number of bytes between the beginning of two consecutive lines
    pub stride: i32,
    /// Pixel format, as a `wl_shm` format code
    pub format: u32,
}

impl BufferHandle {
    /// Id of the `wl_buffer` object, used to release it
    pub fn id(&self) -> u32 {
        self.id
    }

    /// File descriptor of the memory backing the buffer
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.memory.fd.as_fd()
    }

    /// Size of the pool at the time of the call
    pub fn pool_size(&self) -> i32 {
        self.memory.size.get()
    }
}

/// Formats every compositor supports, as required by the protocol
pub const MANDATORY_FORMATS: [u32; 2] = [wl_shm::FORMAT_ARGB8888, wl_shm::FORMAT_XRGB8888];
