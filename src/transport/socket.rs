use std::{
    collections::VecDeque,
    io::{self, IoSlice, IoSliceMut},
    os::unix::{
        io::{AsFd, BorrowedFd, OwnedFd},
        net::UnixStream,
    },
};

use rustix::{
    io::Errno,
    net::{
        recvmsg, sendmsg, RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags, SendAncillaryBuffer,
        SendAncillaryMessage, SendFlags,
    },
};

use crate::wire::{self, Argument, Message, MessageWriteError};

/// Maximum number of file descriptors sent in a single `sendmsg` call
pub const MAX_FDS_OUT: usize = 28;

/// Default limit of received file descriptors waiting to be used by a request
pub const MAX_FDS_IN: usize = 1024;

const READ_CHUNK: usize = 4096;

/// Outcome of [`BufferedSocket::fill_incoming_buffers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many bytes were read, possibly 0 if nothing was available
    Bytes(usize),
    /// The peer closed the connection
    ///
    /// Bytes read before the end of the stream are still buffered.
    Disconnected,
}

/// Outcome of [`BufferedSocket::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flushed {
    /// Everything was written
    Done,
    /// The kernel buffer is full, the remainder is kept for the next flush
    Pending,
    /// The peer is gone
    Disconnected,
}

/// A non-blocking unix stream with buffering and file descriptor passing
#[derive(Debug)]
pub struct BufferedSocket {
    stream: UnixStream,
    in_data: Vec<u8>,
    in_fds: VecDeque<OwnedFd>,
    max_fds_in: usize,
    out_data: Vec<u8>,
    // each fd is tagged with the offset in `out_data` of the message carrying it
    out_fds: VecDeque<(usize, OwnedFd)>,
}

impl BufferedSocket {
    /// Wrap a stream, switching it to non-blocking mode
    pub fn new(stream: UnixStream) -> io::Result<BufferedSocket> {
        stream.set_nonblocking(true)?;
        Ok(BufferedSocket {
            stream,
            in_data: Vec::new(),
            in_fds: VecDeque::new(),
            max_fds_in: MAX_FDS_IN,
            out_data: Vec::new(),
            out_fds: VecDeque::new(),
        })
    }

    /// Change how many received file descriptors may be queued at once
    pub fn set_max_fds_in(&mut self, limit: usize) {
        self.max_fds_in = limit;
    }

    /// The underlying stream
    pub fn stream(&self) -> &UnixStream {
        &self.stream
    }

    /// Read everything the kernel has for us
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] if the peer sent more file descriptors
    /// than the limit while none of them were used yet. The excess is closed.
    pub fn fill_incoming_buffers(&mut self) -> io::Result<Received> {
        let mut total = 0;
        let mut cmsg_space = [0u8; rustix::cmsg_space!(ScmRights(MAX_FDS_OUT))];
        loop {
            let start = self.in_data.len();
            self.in_data.resize(start + READ_CHUNK, 0);
            let mut cmsg_buffer = RecvAncillaryBuffer::new(&mut cmsg_space);
            let res = recvmsg(
                &self.stream,
                &mut [IoSliceMut::new(&mut self.in_data[start..])],
                &mut cmsg_buffer,
                RecvFlags::DONTWAIT | RecvFlags::CMSG_CLOEXEC,
            );
            let read = match res {
                Ok(msg) => msg.bytes,
                Err(Errno::INTR) => {
                    self.in_data.truncate(start);
                    continue;
                }
                Err(Errno::AGAIN) => {
                    self.in_data.truncate(start);
                    return Ok(Received::Bytes(total));
                }
                Err(Errno::CONNRESET) => {
                    self.in_data.truncate(start);
                    return Ok(Received::Disconnected);
                }
                Err(err) => {
                    self.in_data.truncate(start);
                    return Err(err.into());
                }
            };
            self.in_data.truncate(start + read);
            for msg in cmsg_buffer.drain() {
                if let RecvAncillaryMessage::ScmRights(fds) = msg {
                    self.in_fds.extend(fds);
                }
            }
            if self.in_fds.len() > self.max_fds_in {
                self.in_fds.truncate(self.max_fds_in);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("more than {} file descriptors queued", self.max_fds_in),
                ));
            }
            if read == 0 {
                return Ok(Received::Disconnected);
            }
            total += read;
        }
    }

    /// The received bytes not consumed yet, along with the received file descriptors
    pub fn incoming(&mut self) -> (&[u8], &mut VecDeque<OwnedFd>) {
        (&self.in_data, &mut self.in_fds)
    }

    /// Drop `count` bytes from the front of the received data
    pub fn consume(&mut self, count: usize) {
        self.in_data.drain(..count.min(self.in_data.len()));
    }

    /// Encode a message into the outgoing buffer
    ///
    /// Nothing is written to the socket until [`flush`](BufferedSocket::flush) is called.
    pub fn write_message(&mut self, message: Message<OwnedFd>) -> Result<(), MessageWriteError> {
        let offset = self.out_data.len();
        wire::encode(&message, &mut self.out_data)?;
        for arg in message.args {
            if let Argument::Fd(fd) = arg {
                self.out_fds.push_back((offset, fd));
            }
        }
        Ok(())
    }

    /// Whether some data is waiting to be written
    pub fn has_pending_output(&self) -> bool {
        !self.out_data.is_empty()
    }

    /// Write as much of the outgoing buffer as the kernel accepts
    pub fn flush(&mut self) -> io::Result<Flushed> {
        while !self.out_data.is_empty() {
            // fds travel with the first byte of a sendmsg, so the bytes of a message
            // whose fds do not fit this batch wait for the next call
            let fd_count = self.out_fds.len().min(MAX_FDS_OUT);
            let byte_limit = match self.out_fds.get(MAX_FDS_OUT) {
                Some((offset, _)) => *offset,
                None => self.out_data.len(),
            };

            let fds: Vec<BorrowedFd<'_>> = self
                .out_fds
                .iter()
                .take(fd_count)
                .map(|(_, fd)| fd.as_fd())
                .collect();
            let mut cmsg_space = [0u8; rustix::cmsg_space!(ScmRights(MAX_FDS_OUT))];
            let mut cmsg_buffer = SendAncillaryBuffer::new(&mut cmsg_space);
            if !fds.is_empty() {
                cmsg_buffer.push(SendAncillaryMessage::ScmRights(&fds));
            }

            let res = sendmsg(
                &self.stream,
                &[IoSlice::new(&self.out_data[..byte_limit])],
                &mut cmsg_buffer,
                SendFlags::DONTWAIT | SendFlags::NOSIGNAL,
            );
            drop(cmsg_buffer);
            drop(fds);
            let sent = match res {
                Ok(sent) => sent,
                Err(Errno::INTR) => continue,
                Err(Errno::AGAIN) => return Ok(Flushed::Pending),
                Err(Errno::PIPE) | Err(Errno::CONNRESET) => return Ok(Flushed::Disconnected),
                Err(err) => return Err(err.into()),
            };

            self.out_data.drain(..sent);
            self.out_fds.drain(..fd_count);
            for (offset, _) in self.out_fds.iter_mut() {
                *offset = offset.saturating_sub(sent);
            }
        }
        Ok(Flushed::Done)
    }
}
