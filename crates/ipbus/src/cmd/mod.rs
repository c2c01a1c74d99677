use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Subcommand};
use ipbus_target::{Session, TargetConfig, DEFAULT_ADDRESS, DEFAULT_PORT};

use crate::exit::{target_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod bits;
pub mod monitor;
pub mod read;
pub mod simulate;
pub mod status;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query the target's status packet.
    Status,
    /// Read one or more registers.
    Read(ReadArgs),
    /// Write one or more consecutive registers.
    Write(WriteArgs),
    /// Set a single bit with a read-modify-write.
    SetBit(BitArgs),
    /// Clear a single bit with a read-modify-write.
    ClearBit(BitArgs),
    /// Write a bit field inside a register.
    WriteField(WriteFieldArgs),
    /// Poll registers on every heartbeat tick.
    Monitor(MonitorArgs),
    /// Serve a simulated target on a local UDP port.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Status => status::run(target, format),
        Command::Read(args) => read::run(args, target, format),
        Command::Write(args) => write::run(args, target, format),
        Command::SetBit(args) => bits::run_set(args, target, format),
        Command::ClearBit(args) => bits::run_clear(args, target, format),
        Command::WriteField(args) => bits::run_field(args, target, format),
        Command::Monitor(args) => monitor::run(args, target, format),
        Command::Simulate(args) => simulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Connection settings shared by every command that talks to a target.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target host name or IPv4 address.
    #[arg(long, env = "IPBUS_ADDRESS", default_value = DEFAULT_ADDRESS, global = true)]
    pub address: String,
    /// Target UDP port.
    #[arg(long, env = "IPBUS_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,
    /// Local UDP port to bind; ephemeral when unset or taken.
    #[arg(long, env = "IPBUS_LOCAL_PORT", global = true)]
    pub local_port: Option<u16>,
    /// Response timeout (e.g. 100ms, 2s).
    #[arg(long, env = "IPBUS_TIMEOUT", default_value = "100ms", global = true)]
    pub timeout: String,
}

impl TargetArgs {
    pub fn config(&self) -> CliResult<TargetConfig> {
        Ok(TargetConfig::new(self.address.clone())
            .with_port(self.port)
            .with_local_port(self.local_port)
            .with_response_timeout(parse_duration(&self.timeout)?))
    }

    /// Open a session and bring it online with a status exchange.
    pub fn connect(&self) -> CliResult<Session> {
        let session = self.open()?;
        session
            .check_status()
            .map_err(|err| target_error("status failed", err))?;
        Ok(session)
    }

    pub fn open(&self) -> CliResult<Session> {
        Session::open(self.config()?).map_err(|err| target_error("open failed", err))
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Register address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Number of words to read.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
    /// Read every word from the same address (FIFO port).
    #[arg(long)]
    pub non_incrementing: bool,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Register address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Values to write.
    #[arg(required = true, value_parser = parse_u32)]
    pub values: Vec<u32>,
    /// Write every word to the same address (FIFO port).
    #[arg(long)]
    pub non_incrementing: bool,
}

#[derive(Args, Debug)]
pub struct BitArgs {
    /// Register address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Bit index, 0 to 31.
    pub bit: u8,
}

#[derive(Args, Debug)]
pub struct WriteFieldArgs {
    /// Register address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Field value.
    #[arg(value_parser = parse_u32)]
    pub value: u32,
    /// Field width in bits.
    #[arg(long)]
    pub bits: u8,
    /// Position of the field's lowest bit.
    #[arg(long, default_value_t = 0)]
    pub shift: u8,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Registers to poll.
    #[arg(required = true, value_parser = parse_u32)]
    pub addresses: Vec<u32>,
    /// Heartbeat period (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Exit after N samples.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to serve on.
    #[arg(long, default_value = "127.0.0.1:50001")]
    pub bind: SocketAddr,
    /// Preload a register (ADDR=VALUE); may be repeated.
    #[arg(long = "set", value_name = "ADDR=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(u32, u32)>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a decimal or `0x`-prefixed hexadecimal word.
pub fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u32::from_str_radix(&digits.replace('_', ""), 16),
        None => input.replace('_', "").parse(),
    };
    parsed.map_err(|_| format!("invalid 32-bit value: {input}"))
}

fn parse_assignment(input: &str) -> Result<(u32, u32), String> {
    let (address, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=VALUE, got: {input}"))?;
    Ok((parse_u32(address)?, parse_u32(value)?))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
