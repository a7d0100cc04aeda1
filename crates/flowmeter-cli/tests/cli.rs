use std::path::{Path, PathBuf};

use assert_cmd::Command;
use etherparse::PacketBuilder;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("flowmeter"))
}

/// Epoch second whose UTC time of day is 10:00:00.
const TEN_AM: u32 = 1_600_000_000 - 1_600_000_000 % 86_400 + 10 * 3_600;

fn tcp_frame(forward: bool, payload_len: usize) -> Vec<u8> {
    let (src, dst, sport, dport) = if forward {
        ([10, 0, 0, 1], [10, 0, 0, 2], 1234, 80)
    } else {
        ([10, 0, 0, 2], [10, 0, 0, 1], 80, 1234)
    };
    let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1, 1024)
        .ack(1);
    let payload = vec![0u8; payload_len];
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("frame");
    frame
}

/// Legacy microsecond PCAP with Ethernet frames.
fn write_pcap(path: &Path, frames: &[(u32, u32, Vec<u8>)]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&65_535u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    for (sec, usec, data) in frames {
        bytes.extend_from_slice(&sec.to_le_bytes());
        bytes.extend_from_slice(&usec.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(data);
    }
    std::fs::write(path, bytes).expect("write pcap");
}

/// Ten-packet TCP exchange starting at 10:00:00 UTC, one packet every 100 ms.
fn sample_capture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("exchange.pcap");
    let frames = (0..10u32)
        .map(|i| (TEN_AM, i * 100_000, tcp_frame(i % 2 == 0, 10 * i as usize)))
        .collect::<Vec<_>>();
    write_pcap(&path, &frames);
    path
}

fn write_labels(dir: &TempDir, start: &str, end: &str) -> PathBuf {
    let path = dir.path().join("attacks.json");
    let json = format!(
        r#"[{{"direction": "bidirectional", "protocol": "TCP", "src_ip": "10.0.0.1",
            "dst_ip": "10.0.0.2", "start_ts": "{start}", "end_ts": "{end}",
            "label": "Recon", "port_list": [[1234, 80]]}}]"#
    );
    std::fs::write(&path, json).expect("write labels");
    path
}

#[test]
fn help_lists_extract() {
    cmd()
        .arg("pcap")
        .arg("extract")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("--flow-timeout"));
}

#[test]
fn missing_input_shows_error_and_hint() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("missing.pcapng");
    let output = temp.path().join("flows.csv");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(missing)
        .arg("-o")
        .arg(output)
        .assert()
        .code(2)
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn stdout_writes_csv_with_one_row_per_flow() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--stdout")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let lines = stdout.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Session Key,Protocol,Src IP"));
    assert!(lines[1].starts_with("TCP 10.0.0.1 1234 10.0.0.2 80,TCP,10.0.0.1,1234"));
}

#[test]
fn json_output_has_columns_and_rows() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--format")
        .arg("json")
        .arg("--stdout")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    let rows = value["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Flow Pkt Num"], 10);
    assert_eq!(rows[0]["Fwd Flag Ack Num"], 5);
    assert_eq!(
        value["columns"].as_array().map(Vec::len),
        rows[0].as_object().map(|row| row.len())
    );
}

#[test]
fn stdout_and_output_conflict() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--stdout")
        .arg("-o")
        .arg(temp.path().join("flows.csv"))
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn output_written_and_ok_reported() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let output = temp.path().join("out").join("flows.csv");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stderr(contains("OK: 1 flows written"));
    let written = std::fs::read_to_string(output).expect("table");
    assert_eq!(written.lines().count(), 2);
}

#[test]
fn quiet_suppresses_ok_message() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("-o")
        .arg(temp.path().join("flows.csv"))
        .arg("--quiet")
        .assert()
        .success()
        .stderr(contains("OK:").not());
}

#[test]
fn output_must_differ_from_input() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(&input)
        .arg("-o")
        .arg(&input)
        .assert()
        .code(2)
        .stderr(contains("must differ from input"));
}

#[test]
fn glob_input_resolves_single_file() {
    let temp = TempDir::new().expect("tempdir");
    sample_capture(&temp);
    let pattern = temp.path().join("*.pcap");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(pattern)
        .arg("--stdout")
        .assert()
        .success()
        .stdout(contains("Session Key"));
}

#[test]
fn labels_fill_label_column() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let inside = write_labels(&temp, "09:30:00", "10:30:00");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(&input)
        .arg("--labels")
        .arg(&inside)
        .arg("--stdout")
        .assert()
        .success()
        .stdout(contains(",Label").and(contains(",Recon")));

    let outside = write_labels(&temp, "11:00:00", "infinity");
    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(&input)
        .arg("--labels")
        .arg(&outside)
        .arg("--default-label")
        .arg("Benign")
        .arg("--stdout")
        .assert()
        .success()
        .stdout(contains(",Benign").and(contains("Recon").not()));
}

#[test]
fn invalid_labels_are_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let labels = write_labels(&temp, "sometime", "infinity");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--labels")
        .arg(labels)
        .arg("--stdout")
        .assert()
        .code(2)
        .stderr(contains("invalid attack records").and(contains("hint:")));
}

#[test]
fn disabled_extractor_drops_columns() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--disable")
        .arg("TcpFlagCounter")
        .arg("--stdout")
        .assert()
        .success()
        .stdout(contains("Flag Syn").not().and(contains("Pkt Len")));
}

#[test]
fn short_flow_timeout_splits_flows() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--flow-timeout")
        .arg("250000")
        .arg("--stdout")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    // 0-200 ms, 300-500 ms, 600-800 ms, 900 ms.
    assert_eq!(stdout.lines().count(), 5);
}

#[test]
fn empty_capture_is_reported() {
    let temp = TempDir::new().expect("tempdir");
    let input = temp.path().join("empty.pcap");
    write_pcap(&input, &[]);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--stdout")
        .assert()
        .code(2)
        .stderr(contains("no flows were produced"));
}

#[test]
fn pretty_requires_json() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--pretty")
        .arg("--stdout")
        .assert()
        .code(2)
        .stderr(contains("--pretty"));
}

#[test]
fn extractors_lists_builtins() {
    cmd()
        .arg("extractors")
        .assert()
        .success()
        .stdout(
            contains("1. BasicFlowInfo:")
                .and(contains("TcpFlagCounter"))
                .and(contains("Fwd IAT Mean")),
        );
}

#[test]
fn extractors_json_is_parseable() {
    let assert = cmd().arg("extractors").arg("--json").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    let names = value
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "BasicFlowInfo",
            "MacAddrInfo",
            "PacketCounter",
            "TcpFlagCounter",
            "InterArrivalTime",
            "Label"
        ]
    );
}

#[test]
fn output_directories_are_created() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let output = temp.path().join("a").join("b").join("flows.json");

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--format")
        .arg("json")
        .assert()
        .success();
    assert!(output.is_file());
}

#[test]
fn utc_offset_shifts_readable_times_and_label_windows() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let labels = write_labels(&temp, "11:30:00", "12:30:00");

    let assert = cmd()
        .arg("pcap")
        .arg("extract")
        .arg(&input)
        .arg("--labels")
        .arg(&labels)
        .arg("--utc-offset")
        .arg("+02:00")
        .arg("--format")
        .arg("json")
        .arg("--stdout")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    let row = &value["rows"][0];
    assert!(row["Init Ts"].as_str().is_some_and(|ts| ts.ends_with(" 12:00:00.000000")));
    assert_eq!(row["Label"], "Recon");
}

#[test]
fn invalid_utc_offset_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--utc-offset")
        .arg("two hours")
        .arg("--stdout")
        .assert()
        .failure()
        .stderr(contains("+02:00"));
}

#[test]
fn label_column_is_blank_without_labels() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd()
        .arg("pcap")
        .arg("extract")
        .arg(input)
        .arg("--format")
        .arg("json")
        .arg("--stdout")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(value["rows"][0]["Label"], "");
}
