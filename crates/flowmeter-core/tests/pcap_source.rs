use std::fs;
use std::path::Path;

use etherparse::PacketBuilder;
use flowmeter_core::{PacketSource, PcapFileSource, SourceError};
use pcap_parser::Linktype;
use tempfile::TempDir;

fn udp_frame() -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4([192, 168, 0, 1], [192, 168, 0, 2], 64)
        .udp(5000, 53);
    let payload = [1u8, 2, 3, 4];
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("frame");
    frame
}

fn legacy_pcap(magic: u32, linktype: u32, records: &[(u32, u32, &[u8], u32)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&magic.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&65_535u32.to_le_bytes());
    bytes.extend_from_slice(&linktype.to_le_bytes());
    for (sec, frac, data, orig_len) in records {
        bytes.extend_from_slice(&sec.to_le_bytes());
        bytes.extend_from_slice(&frac.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&orig_len.to_le_bytes());
        bytes.extend_from_slice(data);
    }
    bytes
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

fn block(block_type: u32, body: &[u8]) -> Vec<u8> {
    let total = (12 + body.len()) as u32;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block_type.to_le_bytes());
    bytes.extend_from_slice(&total.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(&total.to_le_bytes());
    bytes
}

/// One section, one nanosecond-resolution Ethernet interface.
fn nanosecond_pcapng(ticks: u64, data: &[u8]) -> Vec<u8> {
    let mut shb = Vec::new();
    shb.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
    shb.extend_from_slice(&1u16.to_le_bytes());
    shb.extend_from_slice(&0u16.to_le_bytes());
    shb.extend_from_slice(&(-1i64).to_le_bytes());

    let mut idb = Vec::new();
    idb.extend_from_slice(&1u16.to_le_bytes());
    idb.extend_from_slice(&0u16.to_le_bytes());
    idb.extend_from_slice(&65_535u32.to_le_bytes());
    // if_tsresol = 9
    idb.extend_from_slice(&9u16.to_le_bytes());
    idb.extend_from_slice(&1u16.to_le_bytes());
    idb.extend_from_slice(&[9, 0, 0, 0]);
    idb.extend_from_slice(&[0u8; 4]);

    let mut epb = Vec::new();
    epb.extend_from_slice(&0u32.to_le_bytes());
    epb.extend_from_slice(&((ticks >> 32) as u32).to_le_bytes());
    epb.extend_from_slice(&(ticks as u32).to_le_bytes());
    epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
    epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
    epb.extend_from_slice(data);
    pad4(&mut epb);

    let mut bytes = block(0x0a0d_0d0a, &shb);
    bytes.extend(block(1, &idb));
    bytes.extend(block(6, &epb));
    bytes
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).expect("write capture");
    path
}

fn drain(path: &Path) -> Vec<flowmeter_core::RawFrame> {
    let mut source = PcapFileSource::open(path).expect("open capture");
    let mut frames = Vec::new();
    while let Some(frame) = source.next_frame().expect("frame") {
        frames.push(frame);
    }
    frames
}

#[test]
fn legacy_pcap_frames_keep_time_and_wire_length() {
    let temp = TempDir::new().expect("tempdir");
    let frame = udp_frame();
    let bytes = legacy_pcap(
        0xa1b2_c3d4,
        1,
        &[(100, 250_000, frame.as_slice(), 1500), (101, 0, frame.as_slice(), frame.len() as u32)],
    );
    let frames = drain(&write(&temp, "micro.pcap", &bytes));

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].linktype, Linktype::ETHERNET);
    assert!((frames[0].timestamp - 100.25).abs() < 1e-9);
    assert_eq!(frames[0].wire_len, 1500);
    assert_eq!(frames[0].data, frame);
}

#[test]
fn nanosecond_legacy_pcap_is_scaled() {
    let temp = TempDir::new().expect("tempdir");
    let frame = udp_frame();
    let bytes = legacy_pcap(0xa1b2_3c4d, 101, &[(7, 500_000_000, frame.as_slice(), frame.len() as u32)]);
    let frames = drain(&write(&temp, "nano.pcap", &bytes));

    assert_eq!(frames[0].linktype, Linktype::RAW);
    assert!((frames[0].timestamp - 7.5).abs() < 1e-9);
}

#[test]
fn pcapng_honours_interface_resolution() {
    let temp = TempDir::new().expect("tempdir");
    let frame = udp_frame();
    let frames = drain(&write(&temp, "nano.pcapng", &nanosecond_pcapng(3_250_000_000, &frame)));

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].linktype, Linktype::ETHERNET);
    assert!((frames[0].timestamp - 3.25).abs() < 1e-9);
}

#[test]
fn pcap_source_rejects_truncated_file() {
    let temp = TempDir::new().expect("tempdir");
    let path = write(&temp, "truncated.pcapng", &[0x0a, 0x0d, 0x0d]);
    let err = match PcapFileSource::open(&path) {
        Ok(_) => panic!("expected truncated file to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Io(_)));
}
