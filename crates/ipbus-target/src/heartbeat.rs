use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ipbus_transport::DatagramSocket;
use tracing::{debug, trace};

use crate::error::{Result, TargetError};
use crate::target::{Device, Target};

/// Background thread calling [`Target::tick`] every update period.
///
/// Ticks take the session lock like any other exchange, so they interleave
/// with caller operations but never overlap them. Dropping the handle stops
/// the thread and waits for the current tick to finish.
#[derive(Debug)]
pub struct Heartbeat {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn spawn<D, S>(target: Arc<Target<D, S>>) -> Result<Self>
    where
        D: Device + Send + Sync + 'static,
        S: DatagramSocket + 'static,
    {
        let period = target.session().config().update_period;
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("ipbus-heartbeat".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = target.tick() {
                            trace!(error = %err, "heartbeat tick failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(TargetError::Heartbeat)?;
        debug!(period_ms = period.as_millis() as u64, "heartbeat started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("heartbeat thread panicked");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.shutdown();
    }
}
