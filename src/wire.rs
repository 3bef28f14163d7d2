//! Wire format of the protocol
//!
//! Every message is framed by an 8-byte header followed by its arguments:
//!
//! | bytes | content                                          |
//! |-------|--------------------------------------------------|
//! | 0..4  | id of the object the message is addressed to     |
//! | 4..6  | opcode of the request or event                   |
//! | 6..8  | size of the whole frame, header included         |
//!
//! All numeric fields are little-endian. Arguments are 32-bit aligned: strings
//! and arrays are prefixed by their byte length and padded with zeroes up to the
//! next multiple of 4, file descriptors carry no payload at all and travel
//! out-of-band next to the bytes (see [`crate::transport`]).
//!
//! Decoding requires the [signature](ArgumentType) of the message, which the
//! caller obtains from the interface of the target object, see
//! [`crate::protocol`].

use std::collections::VecDeque;

use smallvec::SmallVec;

/// Size of the fixed message header
pub const HEADER_SIZE: usize = 8;

/// Default upper bound for the size of a single frame
///
/// This matches the buffer size of the reference C implementation, clients
/// are not expected to send anything larger.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Whether a nullable argument may be null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowNull {
    /// The argument may be null
    Yes,
    /// The argument may not be null
    No,
}

/// Type of an argument in a message signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentType {
    /// Signed 32-bit integer
    Int,
    /// Unsigned 32-bit integer
    Uint,
    /// Signed 24.8 fixed point number
    Fixed,
    /// UTF-8 string
    Str(AllowNull),
    /// Id of an existing object
    Object(AllowNull),
    /// Id of an object created by this message
    NewId,
    /// Byte array
    Array,
    /// File descriptor
    Fd,
}

/// A decoded argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument<Fd> {
    /// Signed 32-bit integer
    Int(i32),
    /// Unsigned 32-bit integer
    Uint(u32),
    /// Signed 24.8 fixed point number, stored as its raw representation
    Fixed(i32),
    /// String, `None` if null
    Str(Option<String>),
    /// Object id, 0 if null
    Object(u32),
    /// Id of a newly created object
    NewId(u32),
    /// Byte array
    Array(Vec<u8>),
    /// File descriptor
    Fd(Fd),
}

impl<Fd> Argument<Fd> {
    /// The type of this argument
    ///
    /// Nullable types are reported as allowing null.
    pub fn kind(&self) -> ArgumentType {
        match self {
            Argument::Int(_) => ArgumentType::Int,
            Argument::Uint(_) => ArgumentType::Uint,
            Argument::Fixed(_) => ArgumentType::Fixed,
            Argument::Str(_) => ArgumentType::Str(AllowNull::Yes),
            Argument::Object(_) => ArgumentType::Object(AllowNull::Yes),
            Argument::NewId(_) => ArgumentType::NewId,
            Argument::Array(_) => ArgumentType::Array,
            Argument::Fd(_) => ArgumentType::Fd,
        }
    }
}

/// A framed protocol message, either a request or an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<Fd> {
    /// Id of the object this message is addressed to
    pub sender_id: u32,
    /// Opcode of the message in the interface of the object
    pub opcode: u16,
    /// Arguments, in signature order
    pub args: SmallVec<[Argument<Fd>; 4]>,
}

impl<Fd> Message<Fd> {
    /// Iterate over the file descriptors carried by this message
    pub fn fds(&self) -> impl Iterator<Item = &Fd> {
        self.args.iter().filter_map(|arg| match arg {
            Argument::Fd(fd) => Some(fd),
            _ => None,
        })
    }
}

/// A parsed message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Target object id
    pub object_id: u32,
    /// Opcode of the message
    pub opcode: u16,
    /// Size of the frame, header included
    pub size: u16,
}

/// Error while parsing a message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageParseError {
    /// The buffer does not hold a complete frame yet
    #[error("the buffer does not contain a complete message")]
    Incomplete,
    /// The declared frame size exceeds the configured maximum
    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge {
        /// Declared size
        size: usize,
        /// Configured maximum
        max: usize,
    },
    /// The declared frame size is smaller than a header or not 32-bit aligned
    #[error("invalid message size {0}")]
    BadSize(u16),
    /// The length of an argument runs past the end of the frame
    #[error("argument {index} runs past the end of the message")]
    ArgumentOverflow {
        /// Position of the argument in the signature
        index: usize,
    },
    /// A string argument is not NUL-terminated or is not valid UTF-8
    #[error("argument {index} is not a valid string")]
    BadString {
        /// Position of the argument in the signature
        index: usize,
    },
    /// A non-nullable argument was null
    #[error("argument {index} may not be null")]
    NullNotAllowed {
        /// Position of the argument in the signature
        index: usize,
    },
    /// A new_id argument was 0
    #[error("argument {index} is an invalid new id")]
    InvalidNewId {
        /// Position of the argument in the signature
        index: usize,
    },
    /// The message carries more file descriptors than were received
    #[error("argument {index} expects a file descriptor that was not received")]
    MissingFd {
        /// Position of the argument in the signature
        index: usize,
    },
    /// The frame contains bytes past its last argument
    #[error("{0} trailing bytes after the last argument")]
    TrailingBytes(usize),
    /// An argument does not have the type required by its handler
    #[error("unexpected argument type at position {index}")]
    UnexpectedArgument {
        /// Position of the argument
        index: usize,
    },
}

impl MessageParseError {
    /// Whether this error only means more data is needed
    pub fn is_incomplete(&self) -> bool {
        matches!(self, MessageParseError::Incomplete)
    }
}

/// Error while serializing a message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageWriteError {
    /// The encoded frame does not fit the 16-bit size field
    #[error("encoded message of {0} bytes does not fit in a frame")]
    TooLarge(usize),
    /// A string contains an interior NUL byte
    #[error("string argument contains a NUL byte")]
    NulInString,
}

/// Parse the header at the start of `buffer`
///
/// Returns [`MessageParseError::Incomplete`] if fewer than [`HEADER_SIZE`] bytes are
/// available, and [`MessageParseError::BadSize`] if the size field can never describe
/// a valid frame.
pub fn parse_header(buffer: &[u8]) -> Result<Header, MessageParseError> {
    if buffer.len() < HEADER_SIZE {
        return Err(MessageParseError::Incomplete);
    }
    let object_id = read_u32(buffer, 0);
    let word = read_u32(buffer, 4);
    let header = Header {
        object_id,
        opcode: (word & 0xffff) as u16,
        size: (word >> 16) as u16,
    };
    if (header.size as usize) < HEADER_SIZE || header.size % 4 != 0 {
        return Err(MessageParseError::BadSize(header.size));
    }
    Ok(header)
}

/// Decode one message from the start of `buffer`
///
/// On success, returns the message together with the number of bytes it used. File
/// descriptor arguments are taken from the front of `fds`.
///
/// If the buffer does not contain the whole frame, [`MessageParseError::Incomplete`] is
/// returned and neither `buffer` nor `fds` are consumed: the caller must keep the bytes
/// and try again once more data arrived.
pub fn decode<Fd>(
    buffer: &[u8],
    fds: &mut VecDeque<Fd>,
    signature: &[ArgumentType],
    max_size: usize,
) -> Result<(Message<Fd>, usize), MessageParseError> {
    let header = parse_header(buffer)?;
    let size = header.size as usize;
    if size > max_size {
        return Err(MessageParseError::TooLarge { size, max: max_size });
    }
    if buffer.len() < size {
        return Err(MessageParseError::Incomplete);
    }

    let mut payload = &buffer[HEADER_SIZE..size];
    let mut args = SmallVec::with_capacity(signature.len());

    for (index, kind) in signature.iter().enumerate() {
        let arg = match *kind {
            ArgumentType::Int => Argument::Int(take_u32(&mut payload, index)? as i32),
            ArgumentType::Uint => Argument::Uint(take_u32(&mut payload, index)?),
            ArgumentType::Fixed => Argument::Fixed(take_u32(&mut payload, index)? as i32),
            ArgumentType::Object(allow_null) => {
                let id = take_u32(&mut payload, index)?;
                if id == 0 && allow_null == AllowNull::No {
                    return Err(MessageParseError::NullNotAllowed { index });
                }
                Argument::Object(id)
            }
            ArgumentType::NewId => {
                let id = take_u32(&mut payload, index)?;
                if id == 0 {
                    return Err(MessageParseError::InvalidNewId { index });
                }
                Argument::NewId(id)
            }
            ArgumentType::Str(allow_null) => match take_bytes(&mut payload, index)? {
                None if allow_null == AllowNull::Yes => Argument::Str(None),
                None => return Err(MessageParseError::NullNotAllowed { index }),
                Some(bytes) => {
                    // the length includes the terminating NUL
                    let (last, content) = bytes
                        .split_last()
                        .ok_or(MessageParseError::BadString { index })?;
                    if *last != 0 || content.contains(&0) {
                        return Err(MessageParseError::BadString { index });
                    }
                    let string = std::str::from_utf8(content)
                        .map_err(|_| MessageParseError::BadString { index })?;
                    Argument::Str(Some(string.to_owned()))
                }
            },
            ArgumentType::Array => Argument::Array(
                take_bytes(&mut payload, index)?
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            ),
            // fds are not restored if a later argument fails to parse
            ArgumentType::Fd => match fds.pop_front() {
                Some(fd) => Argument::Fd(fd),
                None => return Err(MessageParseError::MissingFd { index }),
            },
        };
        args.push(arg);
    }

    if !payload.is_empty() {
        return Err(MessageParseError::TrailingBytes(payload.len()));
    }

    Ok((
        Message {
            sender_id: header.object_id,
            opcode: header.opcode,
            args,
        },
        size,
    ))
}

/// Append the encoding of `message` to `out`
///
/// File descriptor arguments produce no bytes: the caller is responsible for sending
/// them along with the data. On error, `out` is left untouched.
pub fn encode<Fd>(message: &Message<Fd>, out: &mut Vec<u8>) -> Result<(), MessageWriteError> {
    let start = out.len();
    out.extend_from_slice(&message.sender_id.to_le_bytes());
    // opcode and size, size is patched once known
    out.extend_from_slice(&[0; 4]);

    for arg in &message.args {
        let res = match arg {
            Argument::Int(v) | Argument::Fixed(v) => {
                out.extend_from_slice(&v.to_le_bytes());
                Ok(())
            }
            Argument::Uint(v) | Argument::Object(v) | Argument::NewId(v) => {
                out.extend_from_slice(&v.to_le_bytes());
                Ok(())
            }
            Argument::Str(None) => {
                out.extend_from_slice(&0u32.to_le_bytes());
                Ok(())
            }
            Argument::Str(Some(s)) => {
                if s.as_bytes().contains(&0) {
                    Err(MessageWriteError::NulInString)
                } else {
                    write_bytes(out, s.as_bytes(), true);
                    Ok(())
                }
            }
            Argument::Array(bytes) => {
                write_bytes(out, bytes, false);
                Ok(())
            }
            Argument::Fd(_) => Ok(()),
        };
        if let Err(err) = res {
            out.truncate(start);
            return Err(err);
        }
    }

    let size = out.len() - start;
    if size > u16::MAX as usize {
        out.truncate(start);
        return Err(MessageWriteError::TooLarge(size));
    }
    let word = ((size as u32) << 16) | message.opcode as u32;
    out[start + 4..start + 8].copy_from_slice(&word.to_le_bytes());
    Ok(())
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn take_u32(payload: &mut &[u8], index: usize) -> Result<u32, MessageParseError> {
    if payload.len() < 4 {
        return Err(MessageParseError::ArgumentOverflow { index });
    }
    let value = read_u32(payload, 0);
    *payload = &payload[4..];
    Ok(value)
}

/// Take a length-prefixed, padded byte sequence, `None` for a length of 0
fn take_bytes<'a>(payload: &mut &'a [u8], index: usize) -> Result<Option<&'a [u8]>, MessageParseError> {
    let len = take_u32(payload, index)? as usize;
    if len == 0 {
        return Ok(None);
    }
    let padded = len
        .checked_add(3)
        .map(|l| l & !3)
        .ok_or(MessageParseError::ArgumentOverflow { index })?;
    if payload.len() < padded {
        return Err(MessageParseError::ArgumentOverflow { index });
    }
    let bytes = &payload[..len];
    *payload = &payload[padded..];
    Ok(Some(bytes))
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8], nul_terminated: bool) {
    let len = bytes.len() + usize::from(nul_terminated);
    out.extend_from_slice(&(len as u32).to_le_bytes());
    out.extend_from_slice(bytes);
    let padded = (len + 3) & !3;
    out.resize(out.len() + padded - bytes.len(), 0);
}
