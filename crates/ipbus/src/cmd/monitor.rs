use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use ipbus_target::{Device, Heartbeat, Session, Target};
use ipbus_transport::DatagramSocket;
use tracing::info;

use crate::cmd::{parse_duration, MonitorArgs, TargetArgs};
use crate::exit::{target_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_registers, OutputFormat, RegisterValue};

/// Reads the watched registers on every sync and hands them to the printer.
struct Sampler {
    addresses: Vec<u32>,
    samples: mpsc::Sender<Vec<RegisterValue>>,
}

impl Device for Sampler {
    fn sync<S: DatagramSocket>(&self, session: &Session<S>) -> ipbus_target::Result<()> {
        let mut values = Vec::with_capacity(self.addresses.len());
        for &address in &self.addresses {
            let value = session.read_register(address)?;
            values.push(RegisterValue { address, value });
        }
        // The printer hangs up once it has enough samples.
        let _ = self.samples.send(values);
        Ok(())
    }
}

pub fn run(args: MonitorArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let period = parse_duration(&args.interval)?;
    let config = target.config()?.with_update_period(period);
    let session = Session::open(config).map_err(|err| target_error("open failed", err))?;
    let peer = session.peer_addr();

    let (samples, received) = mpsc::channel();
    let sampler = Sampler {
        addresses: args.addresses,
        samples,
    };
    let target = Arc::new(Target::new(session, sampler));
    let heartbeat =
        Heartbeat::spawn(Arc::clone(&target)).map_err(|err| target_error("monitor failed", err))?;
    info!(%peer, period_ms = period.as_millis() as u64, "monitoring");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match received.recv_timeout(Duration::from_millis(100)) {
            Ok(values) => {
                print_registers(peer, &values, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(received);
    heartbeat.stop();
    Ok(SUCCESS)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
