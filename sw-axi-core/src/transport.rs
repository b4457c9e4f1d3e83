//! Length-prefixed frame delivery over a byte stream.
//!
//! Every frame is a little-endian `u64` byte count followed by exactly that many bytes.

use crate::error::{Error, Result};
use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const UNIX_SCHEME: &str = "unix://";

/// Longest socket path that fits `sockaddr_un::sun_path` including its terminating NUL.
#[cfg(target_os = "linux")]
pub const MAX_SOCKET_PATH: usize = 107;
#[cfg(not(target_os = "linux"))]
pub const MAX_SOCKET_PATH: usize = 103;

/// A duplex frame channel.
///
/// Sending and receiving are independent: a thread blocked in [`recv_frame`](Self::recv_frame)
/// must not prevent another thread from calling [`send_frame`](Self::send_frame).
/// [`shutdown`](Self::shutdown) unblocks both.
pub trait Transport: Send + Sync + Debug {
    /// Write one frame. Either the whole frame is written or an error is returned.
    fn send_frame(&self, frame: &[u8]) -> io::Result<()>;

    /// Block until one whole frame has been read.
    fn recv_frame(&self) -> io::Result<Vec<u8>>;

    /// Close the channel in both directions. Errors are ignored; calling this more than once is
    /// harmless.
    fn shutdown(&self);
}

/// Parse a rendezvous URI of the form `unix://<path>` into the socket path.
pub fn parse_uri(uri: &str) -> Result<PathBuf> {
    let path = match uri.strip_prefix(UNIX_SCHEME) {
        Some(path) if !path.is_empty() => path,
        _ => return Err(Error::InvalidUri(uri.to_owned())),
    };
    if path.len() > MAX_SOCKET_PATH {
        return Err(Error::PathTooLong {
            path: path.to_owned(),
            len: path.len(),
            max: MAX_SOCKET_PATH,
        });
    }
    Ok(PathBuf::from(path))
}

/// Write `frame` preceded by its size.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    writer.write_all(&(frame.len() as u64).to_le_bytes())?;
    writer.write_all(frame)?;
    writer.flush()
}

/// Read one size-prefixed frame. The peer closing the stream mid-frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut size = [0u8; 8];
    reader.read_exact(&mut size)?;
    let size = u64::from_le_bytes(size);

    // Grow as bytes arrive rather than trusting the declared size up front.
    let mut frame = Vec::new();
    reader.take(size).read_to_end(&mut frame)?;
    if frame.len() as u64 != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("frame truncated after {} of {size} bytes", frame.len()),
        ));
    }
    Ok(frame)
}

/// [`Transport`] over a Unix domain stream socket.
#[derive(Debug)]
pub struct UnixTransport {
    reader: Mutex<UnixStream>,
    writer: Mutex<UnixStream>,
    control: UnixStream,
}

impl UnixTransport {
    pub fn connect(path: &Path) -> io::Result<Self> {
        Self::from_stream(UnixStream::connect(path)?)
    }

    /// Wrap an already connected stream, e.g. one half of [`UnixStream::pair`].
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        Ok(Self {
            reader: Mutex::new(stream.try_clone()?),
            writer: Mutex::new(stream.try_clone()?),
            control: stream,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for UnixTransport {
    fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        write_frame(&mut *lock(&self.writer), frame)
    }

    fn recv_frame(&self) -> io::Result<Vec<u8>> {
        read_frame(&mut *lock(&self.reader))
    }

    fn shutdown(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}
