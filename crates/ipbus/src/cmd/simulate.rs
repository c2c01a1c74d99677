use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ipbus_target::SimulatedTarget;
use tracing::info;

use crate::cmd::monitor::install_ctrlc_handler;
use crate::cmd::SimulateArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    let sim =
        SimulatedTarget::spawn(args.bind).map_err(|err| transport_error("bind failed", err))?;
    for (address, value) in args.set {
        sim.set_register(address, value);
    }

    // Scripts wait for this line before talking to the target.
    println!("listening on {}", sim.local_addr());

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!("simulated target shutting down");
    sim.stop();
    Ok(SUCCESS)
}
