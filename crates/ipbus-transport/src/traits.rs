use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;

/// A datagram socket associated with exactly one remote target.
///
/// Implementations deliver whole datagrams: one `send` is one datagram on the
/// wire and one successful `recv_timeout` yields one received datagram.
pub trait DatagramSocket: Send {
    /// (Re-)associate the socket with `addr`. Replaces any previous peer.
    fn connect(&mut self, addr: SocketAddr) -> Result<()>;

    /// The currently associated remote address, if any.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Send one datagram to the associated peer, returning the bytes written.
    fn send(&mut self, datagram: &[u8]) -> Result<usize>;

    /// Wait up to `timeout` for one datagram from the peer.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A datagram larger than
    /// `buf` is truncated to `buf.len()`.
    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>;
}

impl<T: DatagramSocket + ?Sized> DatagramSocket for Box<T> {
    fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        (**self).connect(addr)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn send(&mut self, datagram: &[u8]) -> Result<usize> {
        (**self).send(datagram)
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        (**self).recv_timeout(buf, timeout)
    }
}
