use std::net::IpAddr;

use flowmeter_core::{
    AttackRecord, FeatureValue, FlowMeter, FlowTimeouts, MeterConfig, PacketRecord, PortPattern,
    SessionDirection, TcpFlag, TcpFlags, build_registry, extract_features,
};

/// Epoch second whose UTC time of day is 10:00:00.
const TEN_AM: f64 = 1_599_991_200.0;

fn ip(value: &str) -> IpAddr {
    value.parse().expect("ip literal")
}

fn tcp(ts: f64, forward: bool, len: u32) -> PacketRecord {
    let (a, b) = (ip("10.0.0.1"), ip("10.0.0.2"));
    let (src, dst, sport, dport) = if forward { (a, b, 1234, 80) } else { (b, a, 80, 1234) };
    PacketRecord::new(ts, len)
        .with_ipv4(src, dst)
        .with_tcp(sport, dport, TcpFlags::empty().with(TcpFlag::Ack))
}

fn exchange() -> Vec<PacketRecord> {
    (0..10)
        .map(|i| tcp(TEN_AM + 0.1 * f64::from(i), i % 2 == 0, 60 + 10 * i))
        .collect()
}

#[test]
fn bidirectional_exchange_is_one_row() {
    let config = MeterConfig::default();
    let flows = FlowMeter::new(config.clone()).segment(exchange());
    assert_eq!(flows.len(), 1);

    let registry = build_registry(&config, None).expect("registry");
    let table = extract_features(&flows, &registry).expect("features");
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.columns, registry.columns());

    let row = &table.rows[0];
    assert_eq!(
        row.get("Session Key"),
        Some(&FeatureValue::from("TCP 10.0.0.1 1234 10.0.0.2 80"))
    );
    assert_eq!(row.get("Init Ts"), Some(&FeatureValue::from("2020-09-13 10:00:00.000000")));
    assert_eq!(row.get("Duration"), Some(&FeatureValue::Int(900_000)));
    assert_eq!(row.get("Flow Pkt Num"), Some(&FeatureValue::Int(10)));
    assert_eq!(row.get("Fwd Pkt Num"), Some(&FeatureValue::Int(5)));
    assert_eq!(row.get("Bwd Flag Ack Num"), Some(&FeatureValue::Int(5)));
    assert_eq!(row.number("Flow IAT Mean"), Some(100_000.0));
    assert_eq!(row.number("Fwd IAT Min"), Some(200_000.0));
    assert_eq!(row.get("Label"), Some(&FeatureValue::from("")));
}

#[test]
fn extraction_is_repeatable() {
    let config = MeterConfig::default();
    let registry = build_registry(&config, None).expect("registry");
    let meter = FlowMeter::new(config);

    let first = extract_features(&meter.segment(exchange()), &registry).expect("first run");
    let second = extract_features(&meter.segment(exchange()), &registry).expect("second run");
    assert_eq!(first, second);
}

#[test]
fn flows_are_sorted_and_bound_their_packets() {
    let mut packets = exchange();
    packets.push(
        PacketRecord::new(TEN_AM + 0.05, 80)
            .with_ipv4(ip("10.0.0.9"), ip("10.0.0.8"))
            .with_udp(5353, 53),
    );
    packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let flows = FlowMeter::new(MeterConfig::default()).segment(packets);
    assert_eq!(flows.len(), 2);
    assert!(flows.windows(2).all(|pair| pair[0].initial_timestamp() <= pair[1].initial_timestamp()));
    for flow in &flows {
        for packet in flow.packets() {
            assert!(flow.initial_timestamp() <= packet.timestamp);
            assert!(packet.timestamp <= flow.last_timestamp());
        }
    }
}

#[test]
fn inactivity_and_lifetime_caps_split_flows() {
    let packets = [0.0, 1.0, 4.9, 9.9].map(|offset| tcp(TEN_AM + offset, true, 60));

    let capped = FlowMeter::new(MeterConfig::default()).segment(packets.clone());
    assert_eq!(capped.iter().map(|flow| flow.len()).collect::<Vec<_>>(), vec![3, 1]);

    let tracked = FlowMeter::new(MeterConfig {
        timeouts: FlowTimeouts::with_activity(5_000_000, 3_000_000),
        ..MeterConfig::default()
    })
    .segment(packets);
    assert_eq!(tracked.iter().map(|flow| flow.len()).collect::<Vec<_>>(), vec![2, 1, 1]);
}

#[test]
fn attack_records_label_matching_flows() {
    let attacks = [AttackRecord {
        direction: SessionDirection::Bidirectional,
        protocol: "TCP".into(),
        src_ip: "10.0.0.2".into(),
        dst_ip: "10.0.0.1".into(),
        start_ts: "09:59:00".into(),
        end_ts: "infinity".into(),
        label: "Recon".into(),
        port_list: vec![(PortPattern::Number(80), PortPattern::Number(1234))],
    }];
    let config = MeterConfig {
        default_label: "Benign".into(),
        ..MeterConfig::default()
    };
    let registry = build_registry(&config, Some(&attacks)).expect("registry");
    assert_eq!(registry.columns().last().map(String::as_str), Some("Label"));

    let mut packets = exchange();
    packets.push(
        PacketRecord::new(TEN_AM + 2.0, 80)
            .with_ipv4(ip("10.0.0.3"), ip("10.0.0.1"))
            .with_tcp(4444, 80, TcpFlags::empty()),
    );
    let flows = FlowMeter::new(config).segment(packets);
    let table = extract_features(&flows, &registry).expect("features");
    let labels = table
        .rows
        .iter()
        .map(|row| row.get("Label").map(ToString::to_string))
        .collect::<Vec<_>>();
    assert_eq!(labels, vec![Some("Recon".to_string()), Some("Benign".to_string())]);
}

#[test]
fn unsorted_records_stay_within_flow_bounds() {
    let mut packets = exchange();
    packets.reverse();
    packets.swap(2, 7);

    let config = MeterConfig::default();
    let flows = FlowMeter::new(config.clone()).segment(packets);
    assert_eq!(flows.len(), 1);
    for flow in &flows {
        assert!(flow.duration() >= 0);
        for packet in flow.packets() {
            assert!(flow.initial_timestamp() <= packet.timestamp);
            assert!(packet.timestamp <= flow.last_timestamp());
        }
    }

    let registry = build_registry(&config, None).expect("registry");
    let table = extract_features(&flows, &registry).expect("features");
    assert_eq!(table.rows[0].get("Duration"), Some(&FeatureValue::Int(900_000)));
    assert_eq!(table.rows[0].number("Flow IAT Min"), Some(100_000.0));
}
