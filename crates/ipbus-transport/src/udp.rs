use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::DatagramSocket;

/// Shortest read timeout handed to the OS; `set_read_timeout` rejects zero.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// UDP transport bound to a local IPv4 port and connected to one target.
///
/// Connecting filters incoming datagrams to the target's address, so a
/// receive only ever yields replies from the associated peer.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind on all IPv4 interfaces.
    ///
    /// With `Some(port)` the socket tries that port first and falls back to an
    /// ephemeral port if it is unavailable; `None` always uses an ephemeral port.
    pub fn bind(local_port: Option<u16>) -> Result<Self> {
        if let Some(port) = local_port {
            let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
            match Self::bind_addr(addr) {
                Ok(transport) => return Ok(transport),
                Err(err) => {
                    warn!(port, error = %err, "local port unavailable, using ephemeral port");
                }
            }
        }
        Self::bind_addr(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
    }

    /// Bind to an explicit local address.
    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind { addr, source: e })?;
        let local_addr = socket.local_addr()?;
        debug!(%local_addr, "bound udp socket");
        Ok(Self {
            socket,
            local_addr,
            peer: None,
        })
    }

    /// The address the socket is bound to (with the OS-assigned port filled in).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl DatagramSocket for UdpTransport {
    fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.socket
            .connect(addr)
            .map_err(|e| TransportError::Connect { addr, source: e })?;
        self.peer = Some(addr);
        info!(%addr, "associated udp socket with target");
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn send(&mut self, datagram: &[u8]) -> Result<usize> {
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }
        loop {
            match self.socket.send(datagram) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.socket
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))?;
            match self.socket.recv(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// Resolve `host:port` to the first IPv4 socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            reason: "no IPv4 address".to_string(),
        })
}
