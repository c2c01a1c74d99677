use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use ipbus_packet::protocol::{MAX_TRANSACTION_WORDS, WORD_SIZE};
use ipbus_packet::{Event, Notifier, Packet, PacketError, TransactionKind};
use ipbus_transport::{resolve, DatagramSocket, UdpTransport};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::error::{Result, TargetError};
use crate::status::{is_status_datagram, status_request, StatusReport};

/// Receive buffer size; anything longer than a packet is rejected anyway.
const RECV_BUFFER_BYTES: usize = 2048;

struct Exchange<S> {
    socket: S,
    peer: SocketAddr,
    recv_buf: Box<[u8; RECV_BUFFER_BYTES]>,
}

/// A connection to one IPbus target.
///
/// Every exchange (status or control) holds the session lock from send to
/// receive, so concurrent callers and the heartbeat never see each other's
/// replies. The online flag only changes while the lock is held.
pub struct Session<S = UdpTransport> {
    config: TargetConfig,
    exchange: Mutex<Exchange<S>>,
    online: AtomicBool,
    notifier: Notifier,
}

impl Session<UdpTransport> {
    /// Bind a UDP socket and associate it with the configured target.
    ///
    /// The session starts offline; call [`Session::check_status`] or
    /// [`Session::reconnect`] to bring it online.
    pub fn open(config: TargetConfig) -> Result<Self> {
        let socket = UdpTransport::bind(config.local_port)?;
        Self::with_socket(socket, config)
    }

    /// Local address of the bound socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.lock().socket.local_addr()
    }
}

impl<S: DatagramSocket> Session<S> {
    /// Use an already bound socket.
    pub fn with_socket(mut socket: S, config: TargetConfig) -> Result<Self> {
        let peer = resolve(&config.address, config.port)?;
        socket.connect(peer)?;
        Ok(Self {
            config,
            exchange: Mutex::new(Exchange {
                socket,
                peer,
                recv_buf: Box::new([0; RECV_BUFFER_BYTES]),
            }),
            online: AtomicBool::new(false),
            notifier: Notifier::new(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Event fan-out for this session.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// True after a successful status exchange and until the next network failure.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Address of the target.
    pub fn peer_addr(&self) -> SocketAddr {
        self.lock().peer
    }

    /// Send a status request and wait for the reply.
    ///
    /// Success sets the session online and emits `StatusOk`. A timeout or a
    /// reply of the wrong shape sets it offline and emits `NoResponse`.
    pub fn check_status(&self) -> Result<StatusReport> {
        let result = {
            let mut exchange = self.lock();
            self.status_exchange(&mut exchange)
        };
        match &result {
            Ok(_) => self.notifier.emit(Event::StatusOk),
            Err(err) => self.report(err),
        }
        result
    }

    /// Re-resolve and re-associate the target address, then check status.
    pub fn reconnect(&self) -> Result<StatusReport> {
        let connected = {
            let mut exchange = self.lock();
            let result = resolve(&self.config.address, self.config.port)
                .and_then(|peer| {
                    exchange.socket.connect(peer)?;
                    Ok(peer)
                })
                .map_err(TargetError::from);
            match result {
                Ok(peer) => {
                    exchange.peer = peer;
                    Ok(())
                }
                Err(err) => {
                    self.set_online(false);
                    Err(err)
                }
            }
        };
        if let Err(err) = connected {
            self.notifier.emit(Event::NoResponse(err.to_string()));
            return Err(err);
        }
        self.check_status()
    }

    /// Send `packet`, wait for its reply and optionally validate it.
    ///
    /// The packet is always reset before returning. An offline session fails
    /// with `NoResponse` reported and without touching the socket; a packet
    /// without transactions succeeds without sending anything.
    pub fn transceive(&self, packet: &mut Packet<'_>, validate: bool) -> Result<()> {
        let result = self.transceive_inner(packet, validate);
        packet.reset();
        result
    }

    fn transceive_inner(&self, packet: &mut Packet<'_>, validate: bool) -> Result<()> {
        let exchanged = {
            let mut exchange = self.lock();
            // A caller queued behind a failed exchange must see its outcome.
            if !self.is_online() {
                Err(TargetError::Offline)
            } else if packet.is_empty() {
                return Ok(());
            } else {
                self.control_exchange(&mut exchange, packet)
            }
        };
        if let Err(err) = exchanged {
            self.report(&err);
            return Err(err);
        }

        if validate {
            packet.process_response(&self.notifier)?;
        }
        Ok(())
    }

    /// Write one register.
    pub fn write_register(&self, address: u32, value: u32) -> Result<()> {
        let mut packet = Packet::new();
        self.build(packet.add_register_write(address, value))?;
        self.transceive(&mut packet, true)
    }

    /// Set bit `n` of a register.
    pub fn set_bit(&self, n: u8, address: u32) -> Result<()> {
        let mut packet = Packet::new();
        self.build(packet.add_set_bit(n, address))?;
        self.transceive(&mut packet, true)
    }

    /// Clear bit `n` of a register.
    pub fn clear_bit(&self, n: u8, address: u32) -> Result<()> {
        let mut packet = Packet::new();
        self.build(packet.add_clear_bit(n, address))?;
        self.transceive(&mut packet, true)
    }

    /// Replace `nbits` bits at `shift` with the low bits of `value`.
    pub fn write_bit_field(&self, address: u32, value: u32, nbits: u8, shift: u8) -> Result<()> {
        let mut packet = Packet::new();
        self.build(packet.add_bit_field_write(address, value, nbits, shift))?;
        self.transceive(&mut packet, true)
    }

    /// Read one register.
    pub fn read_register(&self, address: u32) -> Result<u32> {
        let mut value = 0;
        {
            let mut packet = Packet::new();
            self.build(packet.add_read(
                TransactionKind::Read,
                address,
                1,
                Some(std::slice::from_mut(&mut value)),
            ))?;
            self.transceive(&mut packet, true)?;
        }
        Ok(value)
    }

    /// Read `out.len()` consecutive registers starting at `address`.
    pub fn read_block(&self, address: u32, out: &mut [u32]) -> Result<()> {
        self.read_words(TransactionKind::Read, address, out)
    }

    /// Read `out.len()` words from the same address (a FIFO port).
    pub fn read_fifo(&self, address: u32, out: &mut [u32]) -> Result<()> {
        self.read_words(TransactionKind::NonIncrementingRead, address, out)
    }

    /// Write `data` to consecutive registers starting at `address`.
    pub fn write_block(&self, address: u32, data: &[u32]) -> Result<()> {
        self.write_words(TransactionKind::Write, address, data)
    }

    /// Write every word of `data` to the same address.
    pub fn write_fifo(&self, address: u32, data: &[u32]) -> Result<()> {
        self.write_words(TransactionKind::NonIncrementingWrite, address, data)
    }

    /// Add `addend` to a register, returning the value the target reports.
    pub fn add_to_register(&self, address: u32, addend: u32) -> Result<u32> {
        let mut previous = 0;
        {
            let mut packet = Packet::new();
            self.build(packet.add_rmw_sum(address, addend, Some(&mut previous)))?;
            self.transceive(&mut packet, true)?;
        }
        Ok(previous)
    }

    /// Blocks are split into one packet per 255 words.
    fn read_words(&self, kind: TransactionKind, address: u32, out: &mut [u32]) -> Result<()> {
        let mut offset = 0u32;
        for chunk in out.chunks_mut(MAX_TRANSACTION_WORDS) {
            let words = chunk.len() as u8;
            let mut packet = Packet::new();
            let start = chunk_address(kind, address, offset);
            self.build(packet.add_read(kind, start, words, Some(chunk)))?;
            self.transceive(&mut packet, true)?;
            offset = offset.wrapping_add(u32::from(words));
        }
        Ok(())
    }

    fn write_words(&self, kind: TransactionKind, address: u32, data: &[u32]) -> Result<()> {
        let mut offset = 0u32;
        for chunk in data.chunks(MAX_TRANSACTION_WORDS) {
            let mut packet = Packet::new();
            let start = chunk_address(kind, address, offset);
            self.build(packet.add_write(kind, start, chunk))?;
            self.transceive(&mut packet, true)?;
            offset = offset.wrapping_add(chunk.len() as u32);
        }
        Ok(())
    }

    /// Report a builder error before handing it back.
    fn build<T>(&self, result: std::result::Result<T, PacketError>) -> Result<T> {
        result.map_err(|err| {
            self.notifier.error(err.to_string(), err.category());
            TargetError::from(err)
        })
    }

    fn status_exchange(&self, exchange: &mut Exchange<S>) -> Result<StatusReport> {
        let request = status_request();
        if let Err(err) = exchange.socket.send(&request) {
            self.set_online(false);
            return Err(err.into());
        }

        let Exchange {
            socket,
            peer,
            recv_buf,
        } = exchange;
        let received = socket.recv_timeout(&mut recv_buf[..], self.config.response_timeout);
        let n = match received {
            Ok(Some(n)) => n,
            Ok(None) => {
                self.set_online(false);
                return Err(TargetError::NoResponse {
                    peer: *peer,
                    timeout: self.config.response_timeout,
                });
            }
            Err(err) => {
                self.set_online(false);
                return Err(err.into());
            }
        };

        match StatusReport::decode(&recv_buf[..n]) {
            Some(report) => {
                self.set_online(true);
                debug!(mtu = report.mtu, buffers = report.response_buffers, "status reply");
                Ok(report)
            }
            None => {
                self.set_online(false);
                Err(TargetError::UnexpectedStatus { bytes: n })
            }
        }
    }

    fn control_exchange(
        &self,
        exchange: &mut Exchange<S>,
        packet: &mut Packet<'_>,
    ) -> Result<()> {
        let mut request = BytesMut::with_capacity(packet.request_size() * WORD_SIZE);
        packet.encode_request(&mut request);

        let sent = exchange.socket.send(&request)?;
        if sent != request.len() {
            return Err(TargetError::SendFailed {
                sent,
                expected: request.len(),
            });
        }
        debug!(
            words = packet.request_size(),
            transactions = packet.len(),
            "sent control packet"
        );

        let Exchange {
            socket,
            peer,
            recv_buf,
        } = exchange;

        let mut n = self.receive(socket, &mut recv_buf[..], *peer)?;
        if is_status_datagram(&recv_buf[..n]) {
            warn!("unexpected status packet received");
            n = self.receive(socket, &mut recv_buf[..], *peer)?;
        }

        if n == 0 {
            self.set_online(false);
            return Err(TargetError::EmptyResponse(*peer));
        }
        if n % WORD_SIZE != 0
            || n / WORD_SIZE > packet.response_size()
            || recv_buf[..WORD_SIZE] != packet.header().to_le_bytes()
        {
            self.set_online(false);
            return Err(TargetError::IncorrectResponse { bytes: n });
        }

        let words = packet.load_response(&recv_buf[..n]);
        debug!(words, "received control reply");
        Ok(())
    }

    fn receive(&self, socket: &mut S, buf: &mut [u8], peer: SocketAddr) -> Result<usize> {
        match socket.recv_timeout(buf, self.config.response_timeout) {
            Ok(Some(n)) => Ok(n),
            Ok(None) => {
                self.set_online(false);
                Err(TargetError::NoResponse {
                    peer,
                    timeout: self.config.response_timeout,
                })
            }
            Err(err) => {
                self.set_online(false);
                Err(err.into())
            }
        }
    }

    /// Emit the notification matching an exchange failure.
    fn report(&self, err: &TargetError) {
        match err {
            TargetError::Offline
            | TargetError::NoResponse { .. }
            | TargetError::UnexpectedStatus { .. } => {
                self.notifier.emit(Event::NoResponse(err.to_string()));
            }
            _ => self.notifier.error(err.to_string(), err.category()),
        }
    }

    fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            if online {
                info!(target_addr = %self.config.address, "target online");
            } else {
                warn!(target_addr = %self.config.address, "target offline");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Exchange<S>> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("online", &self.online.load(Ordering::SeqCst))
            .finish()
    }
}

fn chunk_address(kind: TransactionKind, base: u32, offset: u32) -> u32 {
    match kind {
        TransactionKind::Read | TransactionKind::Write => base.wrapping_add(offset),
        _ => base,
    }
}
