mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, TargetArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ipbus", version, about = "IPbus register access over UDP")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.target, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_with_global_target_args() {
        let cli = Cli::try_parse_from([
            "ipbus",
            "read",
            "0x10",
            "--count",
            "4",
            "--address",
            "10.0.0.2",
            "--port",
            "50010",
        ])
        .expect("read args should parse");

        assert_eq!(cli.target.address, "10.0.0.2");
        assert_eq!(cli.target.port, 50010);
        match cli.command {
            Command::Read(args) => {
                assert_eq!(args.address, 0x10);
                assert_eq!(args.count, 4);
                assert!(!args.non_incrementing);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn write_requires_a_value() {
        let err = Cli::try_parse_from(["ipbus", "write", "0x10"])
            .expect_err("write without values should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_invalid_address() {
        let err = Cli::try_parse_from(["ipbus", "read", "0xZZ"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_write_field() {
        let cli = Cli::try_parse_from([
            "ipbus",
            "write-field",
            "0x30",
            "0x5",
            "--bits",
            "4",
            "--shift",
            "8",
        ])
        .expect("write-field args should parse");
        match cli.command {
            Command::WriteField(args) => {
                assert_eq!((args.address, args.value), (0x30, 5));
                assert_eq!((args.bits, args.shift), (4, 8));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_simulate_presets() {
        let cli = Cli::try_parse_from([
            "ipbus",
            "simulate",
            "--bind",
            "127.0.0.1:0",
            "--set",
            "0x1=0xFF",
            "--set",
            "2=3",
        ])
        .expect("simulate args should parse");
        match cli.command {
            Command::Simulate(args) => assert_eq!(args.set, vec![(1, 0xFF), (2, 3)]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
