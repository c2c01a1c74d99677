use crate::cmd::{TargetArgs, WriteArgs};
use crate::exit::{target_error, CliResult, SUCCESS};
use crate::output::{print_ack, OutputFormat};

pub fn run(args: WriteArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let session = target.connect()?;

    let result = match args.values.as_slice() {
        [value] => session.write_register(args.address, *value),
        values if args.non_incrementing => session.write_fifo(args.address, values),
        values => session.write_block(args.address, values),
    };
    result.map_err(|err| target_error("write failed", err))?;

    print_ack(session.peer_addr(), "write", args.address, format);
    Ok(SUCCESS)
}
