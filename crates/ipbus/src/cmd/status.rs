use crate::cmd::TargetArgs;
use crate::exit::{target_error, CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub fn run(target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let session = target.open()?;
    let report = session
        .check_status()
        .map_err(|err| target_error("status failed", err))?;

    print_status(session.peer_addr(), &report, format);
    Ok(SUCCESS)
}
