use std::{
    ffi::{OsStr, OsString},
    fs::{self, File},
    io,
    ops::Range,
    os::unix::{
        fs::OpenOptionsExt,
        io::{AsFd, BorrowedFd},
        net::{UnixListener, UnixStream},
    },
    path::{Path, PathBuf},
};

use rustix::fs::{flock, FlockOperation};
use tracing::debug;

/// Errors that can occur while binding a listening socket
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The `XDG_RUNTIME_DIR` environment variable is not set
    #[error("XDG_RUNTIME_DIR is not set")]
    RuntimeDirNotSet,
    /// Another compositor holds the socket
    #[error("the socket is already in use")]
    AlreadyInUse,
    /// The socket or its lock file cannot be created
    #[error("permission denied while creating the socket")]
    PermissionDenied,
    /// Any other I/O error
    #[error("I/O error while binding the socket")]
    Io(#[source] io::Error),
}

/// A listening socket clients can connect to
///
/// Next to the socket lives a `.lock` file, held with an exclusive `flock` for
/// as long as the socket is alive. A socket file left over by a crashed
/// compositor is only removed after acquiring its lock. Both files are removed
/// when the listener is dropped.
#[derive(Debug)]
pub struct ListeningSocket {
    listener: UnixListener,
    _lock: File,
    socket_path: PathBuf,
    lock_path: PathBuf,
    socket_name: Option<OsString>,
}

impl ListeningSocket {
    /// Bind a socket named `name` in `$XDG_RUNTIME_DIR`
    pub fn bind<S: AsRef<OsStr>>(name: S) -> Result<ListeningSocket, BindError> {
        let runtime_dir: PathBuf = std::env::var_os("XDG_RUNTIME_DIR")
            .ok_or(BindError::RuntimeDirNotSet)?
            .into();
        Self::bind_in(runtime_dir, name)
    }

    /// Bind a socket named `name` in the directory `dir`
    pub fn bind_in<P: AsRef<Path>, S: AsRef<OsStr>>(dir: P, name: S) -> Result<ListeningSocket, BindError> {
        let mut socket = Self::bind_absolute(dir.as_ref().join(name.as_ref()))?;
        socket.socket_name = Some(name.as_ref().to_owned());
        Ok(socket)
    }

    /// Bind the first free socket named `<basename>-<n>` for `n` in `range`, in `$XDG_RUNTIME_DIR`
    pub fn bind_auto(basename: &str, range: Range<usize>) -> Result<ListeningSocket, BindError> {
        let runtime_dir: PathBuf = std::env::var_os("XDG_RUNTIME_DIR")
            .ok_or(BindError::RuntimeDirNotSet)?
            .into();
        Self::bind_auto_in(runtime_dir, basename, range)
    }

    /// Bind the first free socket named `<basename>-<n>` for `n` in `range`, in `dir`
    pub fn bind_auto_in<P: AsRef<Path>>(
        dir: P,
        basename: &str,
        range: Range<usize>,
    ) -> Result<ListeningSocket, BindError> {
        for i in range {
            match Self::bind_in(dir.as_ref(), format!("{}-{}", basename, i)) {
                Ok(socket) => return Ok(socket),
                Err(BindError::AlreadyInUse) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(BindError::AlreadyInUse)
    }

    /// Bind a socket at an absolute path
    ///
    /// The socket has no name, clients must be given its full path.
    pub fn bind_absolute(socket_path: PathBuf) -> Result<ListeningSocket, BindError> {
        let mut lock_path = socket_path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .mode(0o660)
            .open(&lock_path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::PermissionDenied => BindError::PermissionDenied,
                _ => BindError::Io(err),
            })?;

        // a held lock means a live compositor owns the socket
        if flock(&lock, FlockOperation::NonBlockingLockExclusive).is_err() {
            return Err(BindError::AlreadyInUse);
        }

        // we own the lock, a socket file can only be stale
        if socket_path.exists() {
            debug!(path = ?socket_path, "Removing stale socket");
            fs::remove_file(&socket_path).map_err(BindError::Io)?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|err| match err.kind() {
            io::ErrorKind::PermissionDenied => BindError::PermissionDenied,
            io::ErrorKind::AddrInUse => BindError::AlreadyInUse,
            _ => BindError::Io(err),
        })?;
        listener.set_nonblocking(true).map_err(BindError::Io)?;

        Ok(ListeningSocket {
            listener,
            _lock: lock,
            socket_path,
            lock_path,
            socket_name: None,
        })
    }

    /// Accept a pending connection, if any
    ///
    /// This never blocks: `Ok(None)` means no client is waiting. The returned
    /// stream is non-blocking.
    pub fn accept(&self) -> io::Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(stream))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Name of the socket, for `WAYLAND_DISPLAY`
    ///
    /// `None` if it was bound with [`bind_absolute`](ListeningSocket::bind_absolute).
    pub fn socket_name(&self) -> Option<&OsStr> {
        self.socket_name.as_deref()
    }

    /// Full path of the socket
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl AsFd for ListeningSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for ListeningSocket {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.socket_path);
        let _ = fs::remove_file(&self.lock_path);
    }
}
