use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SessionDirection;
use crate::packet::{Direction, NetworkLayer, PacketRecord, TransportLayer};

/// Key used for packets nothing else recognises.
pub const CATCH_ALL_KEY: &str = "OTHER 0 0 0 0";
/// Key of the synthetic flow extractors are probed with.
pub const EMPTY_KEY: &str = "EMPTY 0 0 0 0";

/// Direction-normalized session identifier.
///
/// The first five space-separated fields are always
/// `protocol ip1 port1 ip2 port2`; protocol-specific fields may follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn info(&self) -> SessionKeyInfo {
        SessionKeyInfo::parse(&self.0)
    }

    /// Session key with the direction token appended.
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self(format!("{} {}", self.0, direction))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The 5-tuple carried in the leading fields of a [`SessionKey`].
///
/// # Examples
/// ```
/// use flowmeter_core::SessionKeyInfo;
///
/// let info = SessionKeyInfo::parse("TCP 10.0.0.1 1234 10.0.0.2 80");
/// assert_eq!(info.dst_port, "80");
/// assert_eq!(info.to_string(), "TCP 10.0.0.1 1234 10.0.0.2 80");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKeyInfo {
    pub protocol: String,
    pub src_ip: String,
    pub src_port: String,
    pub dst_ip: String,
    pub dst_port: String,
}

impl SessionKeyInfo {
    /// Missing fields parse as `"0"`, so this never fails.
    pub fn parse(key: &str) -> Self {
        let mut fields = key.split_whitespace();
        let mut next = || fields.next().unwrap_or("0").to_string();
        Self {
            protocol: next(),
            src_ip: next(),
            src_port: next(),
            dst_ip: next(),
            dst_port: next(),
        }
    }
}

impl fmt::Display for SessionKeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.protocol, self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Derives a session key and packet direction from a record.
///
/// Implementations must be total and depend only on protocol, address and
/// port fields.
pub trait SessionExtractor: Send + Sync {
    fn extract(&self, packet: &PacketRecord) -> (SessionKey, Direction);
}

impl<F> SessionExtractor for F
where
    F: Fn(&PacketRecord) -> (SessionKey, Direction) + Send + Sync,
{
    fn extract(&self, packet: &PacketRecord) -> (SessionKey, Direction) {
        self(packet)
    }
}

/// Key layout: TCP/UDP by address and port, ICMP by type/code/id, other IP
/// traffic by next header, bare 802.15.4 frames by frame type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionExtractor;

impl SessionExtractor for DefaultSessionExtractor {
    fn extract(&self, packet: &PacketRecord) -> (SessionKey, Direction) {
        if let Some(network) = &packet.network {
            return ip_session_key(network, packet.transport.as_ref());
        }
        if let Some(wpan) = packet.wpan() {
            return (
                SessionKey::new(format!("WPAN 0 0 0 0 {}", wpan.frame_type)),
                Direction::Forward,
            );
        }
        (SessionKey::new(CATCH_ALL_KEY), Direction::Forward)
    }
}

fn ip_session_key(
    network: &NetworkLayer,
    transport: Option<&TransportLayer>,
) -> (SessionKey, Direction) {
    let (src, dst) = network.addresses();
    let (ip1, ip2, direction) = directional_field(src, dst);

    let key = match transport {
        Some(
            layer @ (TransportLayer::Tcp {
                src_port, dst_port, ..
            }
            | TransportLayer::Udp { src_port, dst_port }),
        ) => {
            let protocol = layer.protocol();
            let (ip1, port1, ip2, port2, direction) =
                order_endpoints(ip1, ip2, direction, *src_port, *dst_port);
            return (
                SessionKey::new(format!("{protocol} {ip1} {port1} {ip2} {port2}")),
                direction,
            );
        }
        Some(TransportLayer::Icmp {
            icmp_type,
            code,
            id,
        }) => format!("ICMP {ip1} 0 {ip2} 0 {icmp_type} {code} {id}"),
        Some(TransportLayer::Icmpv6 { icmp_type, code }) => {
            format!("ICMPv6 {ip1} 0 {ip2} 0 {icmp_type} {code}")
        }
        None => format!(
            "{} {ip1} 0 {ip2} 0 {}",
            network.protocol(),
            network.next_header()
        ),
    };
    (SessionKey::new(key), direction)
}

/// Ports follow their address; equal addresses fall back to ordering the
/// ports themselves.
fn order_endpoints(
    ip1: String,
    ip2: String,
    direction: Direction,
    src_port: u16,
    dst_port: u16,
) -> (String, String, String, String, Direction) {
    if ip1 == ip2 {
        let (port1, port2, direction) = directional_field(src_port, dst_port);
        return (ip1, port1, ip2, port2, direction);
    }
    let (port1, port2) = match direction {
        Direction::Forward => (src_port, dst_port),
        Direction::Backward => (dst_port, src_port),
    };
    (ip1, port1.to_string(), ip2, port2.to_string(), direction)
}

/// Order two field values by their string form.
///
/// The lexically smaller value comes first and the packet is `Forward`;
/// otherwise the pair is swapped and the packet is `Backward`. Ties are
/// `Forward`.
pub fn directional_field<T: ToString>(field1: T, field2: T) -> (String, String, Direction) {
    let (field1, field2) = (field1.to_string(), field2.to_string());
    if field1 <= field2 {
        (field1, field2, Direction::Forward)
    } else {
        (field2, field1, Direction::Backward)
    }
}

/// Applies the run's direction mode on top of a [`SessionExtractor`].
pub struct Sessionizer {
    extractor: Box<dyn SessionExtractor>,
    mode: SessionDirection,
}

impl Sessionizer {
    pub fn new(extractor: Box<dyn SessionExtractor>, mode: SessionDirection) -> Self {
        Self { extractor, mode }
    }

    pub fn key(&self, packet: &PacketRecord) -> (SessionKey, Direction) {
        let (key, direction) = self.extractor.extract(packet);
        match self.mode {
            SessionDirection::Bidirectional => (key, direction),
            SessionDirection::Unidirectional => (key.with_direction(direction), direction),
        }
    }
}

impl fmt::Debug for Sessionizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sessionizer")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
