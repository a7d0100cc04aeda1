use std::net::IpAddr;

use etherparse::{Icmpv4Type, LinkSlice, NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;

use crate::packet::{
    LinkLayer, NetworkLayer, PacketRecord, TcpFlag, TcpFlags, TransportLayer, WpanHeader,
};
use crate::source::RawFrame;

use super::error::DecodeError;
use super::layout;
use super::reader::{Address, WpanReader};

/// Decode a captured frame into a packet record.
///
/// Supports Ethernet II, raw IP and IEEE 802.15.4 linktypes. Layers above
/// the first one the frame does not carry are left empty.
pub fn decode_frame(frame: &RawFrame) -> Result<PacketRecord, DecodeError> {
    let record = PacketRecord::new(frame.timestamp, frame.wire_len);
    match frame.linktype {
        Linktype::ETHERNET => {
            let sliced = SlicedPacket::from_ethernet(&frame.data)
                .map_err(|e| DecodeError::Slice(e.to_string()))?;
            Ok(apply_sliced(record, &sliced))
        }
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => {
            let sliced =
                SlicedPacket::from_ip(&frame.data).map_err(|e| DecodeError::Slice(e.to_string()))?;
            Ok(apply_sliced(record, &sliced))
        }
        Linktype(layout::LINKTYPE_IEEE802_15_4_WITHFCS)
        | Linktype(layout::LINKTYPE_IEEE802_15_4_NOFCS) => {
            Ok(record.with_wpan(parse_wpan_header(&frame.data)?))
        }
        Linktype(other) => Err(DecodeError::UnsupportedLinktype(other)),
    }
}

fn apply_sliced(mut record: PacketRecord, sliced: &SlicedPacket<'_>) -> PacketRecord {
    if let Some(LinkSlice::Ethernet2(eth)) = &sliced.link {
        record = record.with_link(LinkLayer::Ethernet {
            src: eth.source(),
            dst: eth.destination(),
        });
    }

    let Some(net) = &sliced.net else {
        return record;
    };
    let protocol = net
        .ip_payload_ref()
        .map(|payload| payload.ip_number.0)
        .unwrap_or_default();
    let network = match net {
        NetSlice::Ipv4(ipv4) => NetworkLayer::Ipv4 {
            src: IpAddr::V4(ipv4.header().source_addr()),
            dst: IpAddr::V4(ipv4.header().destination_addr()),
            protocol,
        },
        NetSlice::Ipv6(ipv6) => NetworkLayer::Ipv6 {
            src: IpAddr::V6(ipv6.header().source_addr()),
            dst: IpAddr::V6(ipv6.header().destination_addr()),
            next_header: protocol,
        },
        #[allow(unreachable_patterns)]
        _ => return record,
    };
    record = record.with_network(network);

    match &sliced.transport {
        Some(transport) => match transport_layer(transport) {
            Some(layer) => record.with_transport(layer),
            None => record,
        },
        None => record,
    }
}

fn transport_layer(transport: &TransportSlice<'_>) -> Option<TransportLayer> {
    let layer = match transport {
        TransportSlice::Tcp(tcp) => {
            let flags = [
                (TcpFlag::Fin, tcp.fin()),
                (TcpFlag::Syn, tcp.syn()),
                (TcpFlag::Rst, tcp.rst()),
                (TcpFlag::Psh, tcp.psh()),
                (TcpFlag::Ack, tcp.ack()),
                (TcpFlag::Urg, tcp.urg()),
                (TcpFlag::Ece, tcp.ece()),
                (TcpFlag::Cwr, tcp.cwr()),
                (TcpFlag::Ns, tcp.ns()),
            ]
            .into_iter()
            .filter_map(|(flag, set)| set.then_some(flag))
            .collect::<TcpFlags>();
            TransportLayer::Tcp {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                flags,
            }
        }
        TransportSlice::Udp(udp) => TransportLayer::Udp {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
        },
        TransportSlice::Icmpv4(icmp) => {
            let id = match icmp.icmp_type() {
                Icmpv4Type::EchoRequest(echo) | Icmpv4Type::EchoReply(echo) => echo.id,
                _ => 0,
            };
            TransportLayer::Icmp {
                icmp_type: icmp.type_u8(),
                code: icmp.code_u8(),
                id,
            }
        }
        TransportSlice::Icmpv6(icmp) => TransportLayer::Icmpv6 {
            icmp_type: icmp.type_u8(),
            code: icmp.code_u8(),
        },
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(layer)
}

/// Parse the addressing fields of an IEEE 802.15.4 MAC header.
pub fn parse_wpan_header(frame: &[u8]) -> Result<WpanHeader, DecodeError> {
    let mut reader = WpanReader::new(frame);
    let control = reader.read_u16_le()?;
    let frame_version = ((control >> layout::FRAME_VERSION_SHIFT) & layout::TWO_BIT_MASK) as u8;
    let dst_mode = ((control >> layout::DST_ADDR_MODE_SHIFT) & layout::TWO_BIT_MASK) as u8;
    let src_mode = ((control >> layout::SRC_ADDR_MODE_SHIFT) & layout::TWO_BIT_MASK) as u8;
    let pan_compressed = control & layout::PAN_ID_COMPRESSION != 0;

    let sequence_suppressed = frame_version >= layout::FRAME_VERSION_2015
        && control & layout::SEQUENCE_SUPPRESSION != 0;
    if !sequence_suppressed {
        reader.skip(layout::SEQUENCE_LEN)?;
    }

    let mut header = WpanHeader {
        frame_type: (control & layout::FRAME_TYPE_MASK) as u8,
        ..WpanHeader::default()
    };

    if dst_mode != layout::ADDR_MODE_NONE {
        reader.skip(layout::PAN_ID_LEN)?;
    }
    match reader.read_address(dst_mode)? {
        Some(Address::Short(addr)) => header.dst16 = Some(addr),
        Some(Address::Long(addr)) => header.dst64 = Some(addr),
        None => {}
    }

    if src_mode != layout::ADDR_MODE_NONE && !pan_compressed {
        reader.skip(layout::PAN_ID_LEN)?;
    }
    match reader.read_address(src_mode)? {
        Some(Address::Short(addr)) => header.src16 = Some(addr),
        Some(Address::Long(addr)) => header.src64 = Some(addr),
        None => {}
    }

    Ok(header)
}
