//! Defines the interface software slaves expose to the interconnect.

use thiserror::Error;

/// A software slave: the component answering bus requests aimed at its address range.
///
/// Implementors should see this as the AXI *slave* interface they are exposing, while the
/// [`Bridge`](crate::Bridge) acts as the *master* interface, forwarding the requests other IP
/// blocks send to the slave's registered range.
///
/// Accesses are made for `(address, size)` pairs, with `size` being the length of the buffer.
/// Addresses are absolute bus addresses, i.e. they include the base address the slave was
/// registered at. The router only forwards accesses that lie entirely within that range, but a
/// slave should not rely on that to stay panic-free.
///
/// Both handlers are invoked synchronously from the bridge's inbound worker, one at a time, so
/// a slow handler delays every other transaction arriving at this bridge.
///
/// A handler returning an error does not affect the connection: the requesting master receives
/// a failed response, and the bridge carries on.
pub trait Slave: Send {
    /// Handle a read of `buf.len()` bytes at `address`, writing the result to `buf`.
    ///
    /// `buf` is zero-filled when handed out. On error its contents are discarded.
    fn handle_read(&mut self, buf: &mut [u8], address: u64) -> SlaveResult;

    /// Handle a write of the bytes in `buf` to `address`.
    fn handle_write(&mut self, address: u64, buf: &[u8]) -> SlaveResult;
}

pub type SlaveResult = Result<(), SlaveError>;

/// Reasons a slave may refuse an access.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SlaveError {
    #[error("access [{address:#x}+{size:#x}] is outside the slave's address range")]
    OutOfRange { address: u64, size: u64 },
    #[error("{0}")]
    Other(String),
}

impl<S: Slave + ?Sized> Slave for Box<S> {
    fn handle_read(&mut self, buf: &mut [u8], address: u64) -> SlaveResult {
        (**self).handle_read(buf, address)
    }

    fn handle_write(&mut self, address: u64, buf: &[u8]) -> SlaveResult {
        (**self).handle_write(address, buf)
    }
}
