#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::process::{Command, Output, Stdio};

use ipbus_target::SimulatedTarget;

fn ipbus(sim: &SimulatedTarget, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ipbus"))
        .arg("--address")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(sim.local_addr().port().to_string())
        .arg("--timeout")
        .arg("500ms")
        .arg("--log-level")
        .arg("off")
        .arg("--format")
        .arg("json")
        .args(args)
        .output()
        .expect("ipbus command should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).expect("stdout should be one JSON document")
}

#[test]
fn status_reports_target_parameters() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");
    let output = ipbus(&sim, &["status"]);

    assert!(output.status.success(), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["online"], true);
    assert_eq!(json["mtu"], 1472);
}

#[test]
fn read_prints_hex_values() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");
    sim.set_register(0x20, 0xDEAD_BEEF);
    sim.set_register(0x21, 7);

    let output = ipbus(&sim, &["read", "0x20", "--count", "2"]);
    assert!(output.status.success(), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["registers"][0]["address"], "0x00000020");
    assert_eq!(json["registers"][0]["value"], "0xDEADBEEF");
    assert_eq!(json["registers"][1]["value"], "0x00000007");
}

#[test]
fn write_then_bit_operations_update_target() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");

    let output = ipbus(&sim, &["write", "0x10", "0xF0F0"]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_json(&output)["ok"], true);
    assert_eq!(sim.register(0x10), 0xF0F0);

    assert!(ipbus(&sim, &["set-bit", "0x10", "0"]).status.success());
    assert!(ipbus(&sim, &["clear-bit", "0x10", "4"]).status.success());
    assert_eq!(sim.register(0x10), 0xF0E1);

    let output = ipbus(
        &sim,
        &["write-field", "0x10", "0xA", "--bits", "4", "--shift", "8"],
    );
    assert!(output.status.success(), "{output:?}");
    assert_eq!(sim.register(0x10), 0xFAE1);
}

#[test]
fn block_write_spans_consecutive_registers() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");

    let output = ipbus(&sim, &["write", "0x100", "1", "2", "3"]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        [sim.register(0x100), sim.register(0x101), sim.register(0x102)],
        [1, 2, 3]
    );
}

#[test]
fn out_of_range_bit_is_usage_error() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");
    let output = ipbus(&sim, &["set-bit", "0x10", "32"]);

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("set-bit failed"));
}

#[test]
fn silent_target_exits_with_timeout_code() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");
    sim.set_silent(true);

    let output = ipbus(&sim, &["status"]);
    assert_eq!(output.status.code(), Some(124));
    assert!(String::from_utf8_lossy(&output.stderr).contains("status failed"));
}

#[test]
fn monitor_prints_requested_samples() {
    let sim = SimulatedTarget::spawn_local().expect("sim should start");
    sim.set_register(0x5, 42);

    let output = ipbus(
        &sim,
        &["monitor", "0x5", "--interval", "50ms", "--count", "2"],
    );
    assert!(output.status.success(), "{output:?}");
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each sample is a JSON line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["registers"][0]["value"], "0x0000002A");
}

#[test]
fn simulate_serves_preset_registers() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ipbus"))
        .args(["--log-level", "off", "simulate", "--bind", "127.0.0.1:0"])
        .args(["--set", "0x3=0x1234"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("simulate should start");

    let stdout = child.stdout.take().expect("stdout is piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("listening line should be printed");
    let port = line
        .trim()
        .rsplit(':')
        .next()
        .expect("line ends with the port")
        .to_string();

    let output = Command::new(env!("CARGO_BIN_EXE_ipbus"))
        .args(["--address", "127.0.0.1", "--port", &port, "--timeout", "500ms"])
        .args(["--format", "raw", "read", "0x3"])
        .output()
        .expect("read should run");

    let _ = child.kill();
    let _ = child.wait();

    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x00001234");
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipbus"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("ipbus {}", env!("CARGO_PKG_VERSION"))
    );
}
