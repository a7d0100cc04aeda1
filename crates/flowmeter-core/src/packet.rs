//! Decoded packet records consumed by the flow pipeline.
//!
//! A [`PacketRecord`] is the read-only view the core has of a captured frame:
//! a capture timestamp, the frame length and up to three decoded layers. Each
//! layer is a tagged variant, so field presence is a property of the variant
//! rather than something probed at runtime. Callers that need to stay generic
//! over protocols (custom session extractors, custom feature extractors) use
//! [`PacketRecord::has_field`] and [`PacketRecord::field`].

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Protocol families a record can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Wpan,
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
}

impl Protocol {
    /// Name used in session keys.
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Wpan => "WPAN",
            Protocol::Ethernet => "ETH",
            Protocol::Ipv4 => "IPv4",
            Protocol::Ipv6 => "IPv6",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Icmpv6 => "ICMPv6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packet direction relative to the canonical session endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value returned by the generic field accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    UInt(u64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::UInt(value) => write!(f, "{value}"),
            FieldValue::Bool(value) => write!(f, "{}", u8::from(*value)),
        }
    }
}

/// The nine TCP control bits tracked per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpFlag {
    Ack,
    Cwr,
    Ece,
    Fin,
    Ns,
    Psh,
    Rst,
    Syn,
    Urg,
}

impl TcpFlag {
    pub const ALL: [TcpFlag; 9] = [
        TcpFlag::Ack,
        TcpFlag::Cwr,
        TcpFlag::Ece,
        TcpFlag::Fin,
        TcpFlag::Ns,
        TcpFlag::Psh,
        TcpFlag::Rst,
        TcpFlag::Syn,
        TcpFlag::Urg,
    ];

    fn bit(self) -> u16 {
        match self {
            TcpFlag::Fin => 0x001,
            TcpFlag::Syn => 0x002,
            TcpFlag::Rst => 0x004,
            TcpFlag::Psh => 0x008,
            TcpFlag::Ack => 0x010,
            TcpFlag::Urg => 0x020,
            TcpFlag::Ece => 0x040,
            TcpFlag::Cwr => 0x080,
            TcpFlag::Ns => 0x100,
        }
    }

    /// Field name understood by [`PacketRecord::field`].
    pub fn field_name(self) -> &'static str {
        match self {
            TcpFlag::Ack => "flags_ack",
            TcpFlag::Cwr => "flags_cwr",
            TcpFlag::Ece => "flags_ece",
            TcpFlag::Fin => "flags_fin",
            TcpFlag::Ns => "flags_ns",
            TcpFlag::Psh => "flags_psh",
            TcpFlag::Rst => "flags_rst",
            TcpFlag::Syn => "flags_syn",
            TcpFlag::Urg => "flags_urg",
        }
    }

    fn from_field_name(name: &str) -> Option<Self> {
        TcpFlag::ALL
            .into_iter()
            .find(|flag| flag.field_name() == name)
    }
}

/// TCP flag bits as carried in the header (NS in bit 8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(u16);

impl TcpFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits & 0x1ff)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn with(self, flag: TcpFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    pub fn set(&mut self, flag: TcpFlag, on: bool) {
        if on {
            self.0 |= flag.bit();
        } else {
            self.0 &= !flag.bit();
        }
    }

    pub fn contains(self, flag: TcpFlag) -> bool {
        self.0 & flag.bit() != 0
    }
}

impl FromIterator<TcpFlag> for TcpFlags {
    fn from_iter<I: IntoIterator<Item = TcpFlag>>(iter: I) -> Self {
        iter.into_iter().fold(TcpFlags::empty(), TcpFlags::with)
    }
}

/// IEEE 802.15.4 MAC header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WpanHeader {
    pub frame_type: u8,
    pub src16: Option<u16>,
    pub dst16: Option<u16>,
    pub src64: Option<u64>,
    pub dst64: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet { src: [u8; 6], dst: [u8; 6] },
    Wpan(WpanHeader),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkLayer {
    Ipv4 {
        src: IpAddr,
        dst: IpAddr,
        protocol: u8,
    },
    Ipv6 {
        src: IpAddr,
        dst: IpAddr,
        next_header: u8,
    },
}

impl NetworkLayer {
    pub fn protocol(&self) -> Protocol {
        match self {
            NetworkLayer::Ipv4 { .. } => Protocol::Ipv4,
            NetworkLayer::Ipv6 { .. } => Protocol::Ipv6,
        }
    }

    pub fn addresses(&self) -> (IpAddr, IpAddr) {
        match self {
            NetworkLayer::Ipv4 { src, dst, .. } | NetworkLayer::Ipv6 { src, dst, .. } => {
                (*src, *dst)
            }
        }
    }

    /// IPv4 protocol number or IPv6 next header.
    pub fn next_header(&self) -> u8 {
        match self {
            NetworkLayer::Ipv4 { protocol, .. } => *protocol,
            NetworkLayer::Ipv6 { next_header, .. } => *next_header,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp {
        src_port: u16,
        dst_port: u16,
        flags: TcpFlags,
    },
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Icmp {
        icmp_type: u8,
        code: u8,
        id: u16,
    },
    Icmpv6 {
        icmp_type: u8,
        code: u8,
    },
}

impl TransportLayer {
    pub fn protocol(&self) -> Protocol {
        match self {
            TransportLayer::Tcp { .. } => Protocol::Tcp,
            TransportLayer::Udp { .. } => Protocol::Udp,
            TransportLayer::Icmp { .. } => Protocol::Icmp,
            TransportLayer::Icmpv6 { .. } => Protocol::Icmpv6,
        }
    }
}

/// A decoded frame.
///
/// # Examples
/// ```
/// use flowmeter_core::{PacketRecord, Protocol, TcpFlag, TcpFlags};
///
/// let record = PacketRecord::new(1.5, 60)
///     .with_ipv4("10.0.0.1".parse()?, "10.0.0.2".parse()?)
///     .with_tcp(1234, 80, TcpFlags::empty().with(TcpFlag::Syn));
/// assert!(record.has_field(Protocol::Tcp, "flags_syn"));
/// assert_eq!(record.field(Protocol::Tcp, "dstport").unwrap().to_string(), "80");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    /// Capture timestamp in seconds since the epoch.
    pub timestamp: f64,
    /// Frame length on the wire, in bytes.
    pub length: u32,
    pub link: Option<LinkLayer>,
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
}

impl PacketRecord {
    pub fn new(timestamp: f64, length: u32) -> Self {
        Self {
            timestamp,
            length,
            link: None,
            network: None,
            transport: None,
        }
    }

    pub fn with_link(mut self, link: LinkLayer) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_wpan(self, header: WpanHeader) -> Self {
        self.with_link(LinkLayer::Wpan(header))
    }

    pub fn with_network(mut self, network: NetworkLayer) -> Self {
        self.network = Some(network);
        self
    }

    /// Attach an IPv4 layer; the protocol number follows the transport layer
    /// once one is attached.
    pub fn with_ipv4(self, src: IpAddr, dst: IpAddr) -> Self {
        self.with_network(NetworkLayer::Ipv4 {
            src,
            dst,
            protocol: 0,
        })
    }

    pub fn with_ipv6(self, src: IpAddr, dst: IpAddr) -> Self {
        self.with_network(NetworkLayer::Ipv6 {
            src,
            dst,
            next_header: 59,
        })
    }

    pub fn with_transport(mut self, transport: TransportLayer) -> Self {
        let number = match transport {
            TransportLayer::Tcp { .. } => 6,
            TransportLayer::Udp { .. } => 17,
            TransportLayer::Icmp { .. } => 1,
            TransportLayer::Icmpv6 { .. } => 58,
        };
        match &mut self.network {
            Some(NetworkLayer::Ipv4 { protocol, .. }) => *protocol = number,
            Some(NetworkLayer::Ipv6 { next_header, .. }) => *next_header = number,
            None => {}
        }
        self.transport = Some(transport);
        self
    }

    pub fn with_tcp(self, src_port: u16, dst_port: u16, flags: TcpFlags) -> Self {
        self.with_transport(TransportLayer::Tcp {
            src_port,
            dst_port,
            flags,
        })
    }

    pub fn with_udp(self, src_port: u16, dst_port: u16) -> Self {
        self.with_transport(TransportLayer::Udp { src_port, dst_port })
    }

    /// Timestamp in whole microseconds, rounded to the nearest microsecond.
    pub fn timestamp_micros(&self) -> i64 {
        (self.timestamp * 1_000_000.0).round() as i64
    }

    pub fn wpan(&self) -> Option<&WpanHeader> {
        match &self.link {
            Some(LinkLayer::Wpan(header)) => Some(header),
            _ => None,
        }
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match &self.transport {
            Some(TransportLayer::Tcp { flags, .. }) => Some(*flags),
            _ => None,
        }
    }

    /// Whether the record carries a layer of the given protocol.
    pub fn has_layer(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Wpan => matches!(self.link, Some(LinkLayer::Wpan(_))),
            Protocol::Ethernet => matches!(self.link, Some(LinkLayer::Ethernet { .. })),
            Protocol::Ipv4 | Protocol::Ipv6 => self
                .network
                .as_ref()
                .is_some_and(|network| network.protocol() == protocol),
            Protocol::Tcp | Protocol::Udp | Protocol::Icmp | Protocol::Icmpv6 => self
                .transport
                .as_ref()
                .is_some_and(|transport| transport.protocol() == protocol),
        }
    }

    pub fn has_field(&self, protocol: Protocol, name: &str) -> bool {
        self.field(protocol, name).is_some()
    }

    /// Look a header field up by protocol and field name.
    ///
    /// Optional fields (e.g. WPAN short addresses) are absent rather than
    /// defaulted, so `has_field` reflects what the frame actually carried.
    pub fn field(&self, protocol: Protocol, name: &str) -> Option<FieldValue> {
        match protocol {
            Protocol::Wpan => {
                let header = self.wpan()?;
                match name {
                    "frame_type" => Some(FieldValue::UInt(header.frame_type.into())),
                    "src16" => header.src16.map(|addr| FieldValue::Text(format_short(addr))),
                    "dst16" => header.dst16.map(|addr| FieldValue::Text(format_short(addr))),
                    "src64" => header.src64.map(|addr| FieldValue::Text(format_long(addr))),
                    "dst64" => header.dst64.map(|addr| FieldValue::Text(format_long(addr))),
                    _ => None,
                }
            }
            Protocol::Ethernet => match (&self.link, name) {
                (Some(LinkLayer::Ethernet { src, .. }), "src") => {
                    Some(FieldValue::Text(format_mac(src)))
                }
                (Some(LinkLayer::Ethernet { dst, .. }), "dst") => {
                    Some(FieldValue::Text(format_mac(dst)))
                }
                _ => None,
            },
            Protocol::Ipv4 | Protocol::Ipv6 => {
                let network = self.network.as_ref().filter(|n| n.protocol() == protocol)?;
                let (src, dst) = network.addresses();
                match name {
                    "src" => Some(FieldValue::Text(src.to_string())),
                    "dst" => Some(FieldValue::Text(dst.to_string())),
                    "proto" | "nh" => Some(FieldValue::UInt(network.next_header().into())),
                    _ => None,
                }
            }
            Protocol::Tcp | Protocol::Udp | Protocol::Icmp | Protocol::Icmpv6 => {
                let transport = self
                    .transport
                    .as_ref()
                    .filter(|t| t.protocol() == protocol)?;
                transport_field(transport, name)
            }
        }
    }
}

fn transport_field(transport: &TransportLayer, name: &str) -> Option<FieldValue> {
    match (transport, name) {
        (
            TransportLayer::Tcp { src_port, .. } | TransportLayer::Udp { src_port, .. },
            "srcport",
        ) => Some(FieldValue::UInt((*src_port).into())),
        (
            TransportLayer::Tcp { dst_port, .. } | TransportLayer::Udp { dst_port, .. },
            "dstport",
        ) => Some(FieldValue::UInt((*dst_port).into())),
        (TransportLayer::Tcp { flags, .. }, "flags") => {
            Some(FieldValue::UInt(flags.bits().into()))
        }
        (TransportLayer::Tcp { flags, .. }, name) => {
            TcpFlag::from_field_name(name).map(|flag| FieldValue::Bool(flags.contains(flag)))
        }
        (
            TransportLayer::Icmp { icmp_type, .. } | TransportLayer::Icmpv6 { icmp_type, .. },
            "type",
        ) => Some(FieldValue::UInt((*icmp_type).into())),
        (TransportLayer::Icmp { code, .. } | TransportLayer::Icmpv6 { code, .. }, "code") => {
            Some(FieldValue::UInt((*code).into()))
        }
        (TransportLayer::Icmp { id, .. }, "id") => Some(FieldValue::UInt((*id).into())),
        _ => None,
    }
}

fn format_short(addr: u16) -> String {
    format!("0x{addr:04x}")
}

fn format_long(addr: u64) -> String {
    let bytes = addr.to_be_bytes();
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn format_mac(addr: &[u8; 6]) -> String {
    addr.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
