use tracing::debug;

use crate::cmd::ReadArgs;
use crate::cmd::TargetArgs;
use crate::exit::{target_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_registers, OutputFormat, RegisterValue};

pub fn run(args: ReadArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "count must be greater than zero"));
    }

    let session = target.connect()?;
    let mut words = vec![0u32; args.count];
    let result = if args.non_incrementing {
        session.read_fifo(args.address, &mut words)
    } else {
        session.read_block(args.address, &mut words)
    };
    result.map_err(|err| target_error("read failed", err))?;
    debug!(address = args.address, count = args.count, "read complete");

    let values: Vec<RegisterValue> = words
        .into_iter()
        .enumerate()
        .map(|(index, value)| RegisterValue {
            address: if args.non_incrementing {
                args.address
            } else {
                args.address.wrapping_add(index as u32)
            },
            value,
        })
        .collect();

    print_registers(session.peer_addr(), &values, format);
    Ok(SUCCESS)
}
