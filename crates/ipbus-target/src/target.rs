use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipbus_packet::Event;
use ipbus_transport::{DatagramSocket, UdpTransport};
use tracing::{debug, warn};

use crate::error::Result;
use crate::session::Session;
use crate::status::StatusReport;

/// A concrete device behind an IPbus target.
///
/// `sync` refreshes whatever state the device derives from its registers.
/// It runs after every successful write (unless the caller suppresses it)
/// and on every heartbeat tick while the target is online.
pub trait Device {
    fn sync<S: DatagramSocket>(&self, session: &Session<S>) -> Result<()>;
}

/// A device that has nothing to refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSync;

impl Device for NoSync {
    fn sync<S: DatagramSocket>(&self, _session: &Session<S>) -> Result<()> {
        Ok(())
    }
}

/// A [`Session`] paired with the [`Device`] it drives.
pub struct Target<D, S = UdpTransport> {
    session: Session<S>,
    device: D,
    heartbeat_enabled: Arc<AtomicBool>,
}

impl<D: Device, S: DatagramSocket> Target<D, S> {
    /// Compose a session with a device.
    ///
    /// With `pause_heartbeat_on_error` set, any error event stops heartbeat
    /// ticks until [`Target::reconnect`]. Otherwise ticks keep polling status
    /// while the session is offline.
    pub fn new(session: Session<S>, device: D) -> Self {
        let heartbeat_enabled = Arc::new(AtomicBool::new(true));
        if session.config().pause_heartbeat_on_error {
            let flag = Arc::clone(&heartbeat_enabled);
            session.notifier().subscribe(move |event| {
                if let Event::Error { .. } = event {
                    if flag.swap(false, Ordering::SeqCst) {
                        debug!("heartbeat paused after error");
                    }
                }
            });
        }
        Self {
            session,
            device,
            heartbeat_enabled,
        }
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// False once an error has paused the heartbeat.
    pub fn is_heartbeat_active(&self) -> bool {
        self.heartbeat_enabled.load(Ordering::SeqCst)
    }

    /// One heartbeat step: sync while online, poll status while offline.
    /// Does nothing while the heartbeat is paused.
    pub fn tick(&self) -> Result<()> {
        if !self.is_heartbeat_active() {
            return Ok(());
        }
        if self.session.is_online() {
            self.device.sync(&self.session)
        } else {
            self.session.check_status().map(|_| ())
        }
    }

    /// Re-associate the socket, resume the heartbeat and check status.
    pub fn reconnect(&self) -> Result<StatusReport> {
        self.heartbeat_enabled.store(true, Ordering::SeqCst);
        self.session.reconnect()
    }

    /// Write one register, then sync if asked to.
    ///
    /// An `Err` from `sync` is returned as is, even though the write itself
    /// was applied; the same holds for the other write methods.
    pub fn write_register(&self, address: u32, value: u32, sync_on_success: bool) -> Result<()> {
        self.session.write_register(address, value)?;
        self.after_write(sync_on_success)
    }

    pub fn set_bit(&self, n: u8, address: u32, sync_on_success: bool) -> Result<()> {
        self.session.set_bit(n, address)?;
        self.after_write(sync_on_success)
    }

    pub fn clear_bit(&self, n: u8, address: u32, sync_on_success: bool) -> Result<()> {
        self.session.clear_bit(n, address)?;
        self.after_write(sync_on_success)
    }

    pub fn write_bit_field(
        &self,
        address: u32,
        value: u32,
        nbits: u8,
        shift: u8,
        sync_on_success: bool,
    ) -> Result<()> {
        self.session.write_bit_field(address, value, nbits, shift)?;
        self.after_write(sync_on_success)
    }

    pub fn read_register(&self, address: u32) -> Result<u32> {
        self.session.read_register(address)
    }

    fn after_write(&self, sync_on_success: bool) -> Result<()> {
        if !sync_on_success {
            return Ok(());
        }
        self.device.sync(&self.session).inspect_err(|err| {
            warn!(error = %err, "sync after write failed");
        })
    }
}

impl<D, S> std::fmt::Debug for Target<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("session", &self.session)
            .field(
                "heartbeat_enabled",
                &self.heartbeat_enabled.load(Ordering::SeqCst),
            )
            .finish()
    }
}
