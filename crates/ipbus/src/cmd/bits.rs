use crate::cmd::{BitArgs, TargetArgs, WriteFieldArgs};
use crate::exit::{target_error, CliResult, SUCCESS};
use crate::output::{print_ack, OutputFormat};

pub fn run_set(args: BitArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let session = target.connect()?;
    session
        .set_bit(args.bit, args.address)
        .map_err(|err| target_error("set-bit failed", err))?;

    print_ack(session.peer_addr(), "set-bit", args.address, format);
    Ok(SUCCESS)
}

pub fn run_clear(args: BitArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let session = target.connect()?;
    session
        .clear_bit(args.bit, args.address)
        .map_err(|err| target_error("clear-bit failed", err))?;

    print_ack(session.peer_addr(), "clear-bit", args.address, format);
    Ok(SUCCESS)
}

pub fn run_field(
    args: WriteFieldArgs,
    target: &TargetArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let session = target.connect()?;
    session
        .write_bit_field(args.address, args.value, args.bits, args.shift)
        .map_err(|err| target_error("write-field failed", err))?;

    print_ack(session.peer_addr(), "write-field", args.address, format);
    Ok(SUCCESS)
}
