use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipbus_target::StatusReport;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    peer: String,
    online: bool,
    mtu: u32,
    response_buffers: u32,
    next_packet_id: u16,
    next_packet_header: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    pub address: u32,
    pub value: u32,
}

#[derive(Serialize)]
struct RegistersOutput {
    peer: String,
    registers: Vec<RegisterRow>,
    timestamp: String,
}

#[derive(Serialize)]
struct RegisterRow {
    address: String,
    value: String,
}

impl From<&RegisterValue> for RegisterRow {
    fn from(raw: &RegisterValue) -> Self {
        Self {
            address: hex(raw.address),
            value: hex(raw.value),
        }
    }
}

#[derive(Serialize)]
struct AckOutput<'a> {
    peer: String,
    operation: &'a str,
    address: String,
    ok: bool,
}

pub fn print_status(peer: SocketAddr, report: &StatusReport, format: OutputFormat) {
    let out = StatusOutput {
        peer: peer.to_string(),
        online: true,
        mtu: report.mtu,
        response_buffers: report.response_buffers,
        next_packet_id: report.next_packet_id(),
        next_packet_header: hex(report.next_packet_header),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "MTU", "BUFFERS", "NEXT ID"])
                .add_row(vec![
                    out.peer.clone(),
                    out.mtu.to_string(),
                    out.response_buffers.to_string(),
                    out.next_packet_id.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Target Status:");
            println!("  Peer:             {}", out.peer);
            println!("  MTU:              {} bytes", out.mtu);
            println!("  Response buffers: {}", out.response_buffers);
            println!(
                "  Next packet:      {} ({})",
                out.next_packet_id, out.next_packet_header
            );
        }
        OutputFormat::Raw => println!("{}", out.peer),
    }
}

pub fn print_registers(peer: SocketAddr, values: &[RegisterValue], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RegistersOutput {
                peer: peer.to_string(),
                registers: values.iter().map(RegisterRow::from).collect(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "VALUE", "DECIMAL"]);
            for row in values {
                table.add_row(vec![hex(row.address), hex(row.value), row.value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in values {
                println!("{} = {} ({})", hex(row.address), hex(row.value), row.value);
            }
        }
        OutputFormat::Raw => {
            for row in values {
                println!("{}", hex(row.value));
            }
        }
    }
}

pub fn print_ack(peer: SocketAddr, operation: &str, address: u32, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&AckOutput {
            peer: peer.to_string(),
            operation,
            address: hex(address),
            ok: true,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{operation} {} ok", hex(address));
        }
        OutputFormat::Raw => {}
    }
}

/// Eight-digit hex with a 0x prefix.
pub fn hex(value: u32) -> String {
    format!("0x{value:08X}")
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
