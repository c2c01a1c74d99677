//! In-process IPbus target.
//!
//! Answers status requests and control packets from an in-memory register
//! map. Used by the integration tests and by `ipbus simulate`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use ipbus_packet::codec::{get_words_le, put_words_le, TransactionHeader};
use ipbus_packet::protocol::{
    INFO_BAD_HEADER, INFO_REQUEST, INFO_SUCCESS, MAX_PACKET_BYTES, MAX_PACKET_WORDS,
    PROTOCOL_VERSION,
};
use ipbus_packet::{encode_packet_header, PacketHeader, PacketType, TransactionKind};
use ipbus_transport::{Result, TransportError};
use tracing::{debug, info, trace};

use crate::status::{is_status_datagram, StatusReport};

/// Poll interval of the serving thread's stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Register and configuration spaces of a simulated target.
#[derive(Debug, Default, Clone)]
pub struct RegisterMap {
    registers: HashMap<u32, u32>,
    configuration: HashMap<u32, u32>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register value; unset registers read as 0.
    pub fn get(&self, address: u32) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    pub fn set(&mut self, address: u32, value: u32) {
        self.registers.insert(address, value);
    }

    /// Configuration space value; unset entries read as 0.
    pub fn config(&self, address: u32) -> u32 {
        self.configuration.get(&address).copied().unwrap_or(0)
    }

    pub fn set_config(&mut self, address: u32, value: u32) {
        self.configuration.insert(address, value);
    }

    /// Build the reply to one datagram, or `None` if it deserves no answer.
    ///
    /// Control packets are executed transaction by transaction; a malformed
    /// transaction gets a bad-header reply and ends the packet.
    pub fn respond(&mut self, datagram: &[u8]) -> Option<BytesMut> {
        if is_status_datagram(datagram) {
            let report = StatusReport {
                mtu: MAX_PACKET_BYTES as u32,
                response_buffers: 1,
                next_packet_header: encode_packet_header(PacketType::Control, 1),
                ..StatusReport::default()
            };
            return Some(report.encode());
        }

        let mut request = [0u32; MAX_PACKET_WORDS];
        let count = get_words_le(datagram, &mut request);
        if count == 0 {
            return None;
        }
        let header = PacketHeader::decode(request[0]);
        if header.version != PROTOCOL_VERSION
            || PacketType::from_bits(header.packet_type) != Some(PacketType::Control)
        {
            trace!(header = request[0], "ignoring non-control packet");
            return None;
        }

        let mut reply = vec![request[0]];
        let mut pos = 1;
        while pos + 1 < count {
            let th = TransactionHeader::decode(request[pos]);
            let address = request[pos + 1];
            pos += 2;

            let kind = match th.kind() {
                Some(kind) if th.version == PROTOCOL_VERSION && th.info_code == INFO_REQUEST => {
                    kind
                }
                _ => {
                    reply.push(reply_header(th, INFO_BAD_HEADER));
                    break;
                }
            };
            let words = usize::from(th.words);

            match kind {
                TransactionKind::Read | TransactionKind::NonIncrementingRead => {
                    reply.push(reply_header(th, INFO_SUCCESS));
                    for i in 0..words {
                        let at = step(kind, address, i);
                        reply.push(self.get(at));
                    }
                }
                TransactionKind::ConfigurationRead => {
                    reply.push(reply_header(th, INFO_SUCCESS));
                    for i in 0..words {
                        reply.push(self.config(address.wrapping_add(i as u32)));
                    }
                }
                TransactionKind::Write
                | TransactionKind::NonIncrementingWrite
                | TransactionKind::ConfigurationWrite => {
                    if pos + words > count {
                        reply.push(reply_header(th, INFO_BAD_HEADER));
                        break;
                    }
                    for (i, value) in request[pos..pos + words].iter().enumerate() {
                        if kind == TransactionKind::ConfigurationWrite {
                            self.set_config(address.wrapping_add(i as u32), *value);
                        } else {
                            self.set(step(kind, address, i), *value);
                        }
                    }
                    pos += words;
                    reply.push(reply_header(th, INFO_SUCCESS));
                }
                TransactionKind::ReadModifyWriteBits => {
                    if pos + 2 > count {
                        reply.push(reply_header(th, INFO_BAD_HEADER));
                        break;
                    }
                    let (and, or) = (request[pos], request[pos + 1]);
                    pos += 2;
                    let previous = self.get(address);
                    self.set(address, (previous & and) | or);
                    reply.push(reply_header(th, INFO_SUCCESS));
                    reply.push(previous);
                }
                TransactionKind::ReadModifyWriteSum => {
                    if pos + 1 > count {
                        reply.push(reply_header(th, INFO_BAD_HEADER));
                        break;
                    }
                    let addend = request[pos];
                    pos += 1;
                    let previous = self.get(address);
                    self.set(address, previous.wrapping_add(addend));
                    reply.push(reply_header(th, INFO_SUCCESS));
                    reply.push(previous);
                }
            }
        }

        let mut buf = BytesMut::with_capacity(reply.len() * 4);
        put_words_le(&reply, &mut buf);
        Some(buf)
    }
}

fn reply_header(request: TransactionHeader, info_code: u8) -> u32 {
    TransactionHeader {
        info_code,
        ..request
    }
    .encode()
}

fn step(kind: TransactionKind, address: u32, index: usize) -> u32 {
    match kind {
        TransactionKind::NonIncrementingRead | TransactionKind::NonIncrementingWrite => address,
        _ => address.wrapping_add(index as u32),
    }
}

/// A simulated target serving on a UDP socket from a background thread.
#[derive(Debug)]
pub struct SimulatedTarget {
    local_addr: SocketAddr,
    registers: Arc<Mutex<RegisterMap>>,
    silent: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedTarget {
    /// Bind `addr` and start answering.
    pub fn spawn(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind { addr, source: e })?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let registers = Arc::new(Mutex::new(RegisterMap::new()));
        let silent = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let registers = Arc::clone(&registers);
            let silent = Arc::clone(&silent);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("ipbus-sim".to_string())
                .spawn(move || serve(&socket, &registers, &silent, &running))?
        };
        info!(%local_addr, "simulated target listening");

        Ok(Self {
            local_addr,
            registers,
            silent,
            running,
            handle: Some(handle),
        })
    }

    /// Bind an ephemeral loopback port.
    pub fn spawn_local() -> Result<Self> {
        Self::spawn(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop (or resume) answering; requests are still consumed.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    pub fn register(&self, address: u32) -> u32 {
        self.registers().get(address)
    }

    pub fn set_register(&self, address: u32, value: u32) {
        self.registers().set(address, value);
    }

    /// Stop the serving thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn registers(&self) -> std::sync::MutexGuard<'_, RegisterMap> {
        self.registers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedTarget {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(
    socket: &UdpSocket,
    registers: &Mutex<RegisterMap>,
    silent: &AtomicBool,
    running: &AtomicBool,
) {
    let mut buf = [0u8; 2048];
    while running.load(Ordering::SeqCst) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(error = %err, "simulated target receive failed");
                continue;
            }
        };
        if silent.load(Ordering::SeqCst) {
            trace!(bytes = n, %from, "dropping request while silent");
            continue;
        }
        let reply = registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .respond(&buf[..n]);
        if let Some(reply) = reply {
            if let Err(err) = socket.send_to(&reply, from) {
                debug!(error = %err, %from, "simulated target send failed");
            }
        }
    }
}
