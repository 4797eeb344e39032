//! TCP probe construction
//!
//! Liveness probes are bare TCP headers carrying either SYN or ACK. For
//! IPv4 the full IP header is built here and sent through a header-included
//! raw socket; for IPv6 the kernel builds the IP header and only the TCP
//! segment is constructed. Either way the TCP checksum covers the
//! pseudo-header, so the resolved source address is required up front.

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::tcp::{ipv4_checksum, ipv6_checksum, MutableTcpPacket, TcpFlags};
use pulsescan_core::{Error, Result};
use rand::Rng;
use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;
const PROBE_TTL: u8 = 64;
const PROBE_WINDOW: u16 = 65535;

/// Which TCP flag a probe carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpProbeKind {
    Syn,
    Ack,
}

impl TcpProbeKind {
    /// Flag bits for the TCP header
    pub fn bits(&self) -> u8 {
        match self {
            TcpProbeKind::Syn => TcpFlags::SYN,
            TcpProbeKind::Ack => TcpFlags::ACK,
        }
    }
}

impl std::fmt::Display for TcpProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpProbeKind::Syn => write!(f, "SYN"),
            TcpProbeKind::Ack => write!(f, "ACK"),
        }
    }
}

/// Build a complete IPv4 packet (IP header + TCP header) for one probe
pub fn build_ipv4_probe(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    kind: TcpProbeKind,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; IPV4_HEADER_LEN + TCP_HEADER_LEN];

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer[..IPV4_HEADER_LEN])
            .ok_or_else(|| Error::Network("IPv4 header buffer too small".to_string()))?;
        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_total_length((IPV4_HEADER_LEN + TCP_HEADER_LEN) as u16);
        ip.set_identification(rand::thread_rng().gen());
        ip.set_flags(2); // don't fragment
        ip.set_ttl(PROBE_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(src);
        ip.set_destination(dst);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    fill_tcp_header(&mut buffer[IPV4_HEADER_LEN..], src_port, dst_port, kind)?;
    {
        let mut tcp = MutableTcpPacket::new(&mut buffer[IPV4_HEADER_LEN..])
            .ok_or_else(|| Error::Network("TCP header buffer too small".to_string()))?;
        let checksum = ipv4_checksum(&tcp.to_immutable(), &src, &dst);
        tcp.set_checksum(checksum);
    }

    Ok(buffer)
}

/// Build a bare TCP segment for an IPv6 probe
///
/// Raw IPv6 sockets leave the transport checksum to the sender, so it is
/// computed here over the v6 pseudo-header.
pub fn build_ipv6_segment(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    src_port: u16,
    dst_port: u16,
    kind: TcpProbeKind,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; TCP_HEADER_LEN];

    fill_tcp_header(&mut buffer, src_port, dst_port, kind)?;
    let mut tcp = MutableTcpPacket::new(&mut buffer)
        .ok_or_else(|| Error::Network("TCP header buffer too small".to_string()))?;
    let checksum = ipv6_checksum(&tcp.to_immutable(), &src, &dst);
    tcp.set_checksum(checksum);

    Ok(buffer)
}

fn fill_tcp_header(
    buffer: &mut [u8],
    src_port: u16,
    dst_port: u16,
    kind: TcpProbeKind,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut tcp = MutableTcpPacket::new(buffer)
        .ok_or_else(|| Error::Network("TCP header buffer too small".to_string()))?;
    tcp.set_source(src_port);
    tcp.set_destination(dst_port);
    tcp.set_sequence(rng.gen());
    tcp.set_acknowledgement(match kind {
        // an ACK probe needs a plausible acknowledgement number
        TcpProbeKind::Ack => rng.gen(),
        TcpProbeKind::Syn => 0,
    });
    tcp.set_data_offset((TCP_HEADER_LEN / 4) as u8);
    tcp.set_reserved(0);
    tcp.set_flags(kind.bits());
    tcp.set_window(PROBE_WINDOW);
    tcp.set_urgent_ptr(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ipv4::Ipv4Packet;
    use pnet::packet::tcp::TcpPacket;
    use pnet::packet::Packet;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn test_ipv4_probe_headers() {
        let buffer = build_ipv4_probe(SRC, DST, 50053, 80, TcpProbeKind::Syn).unwrap();
        assert_eq!(buffer.len(), 40);

        let ip = Ipv4Packet::new(&buffer).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_source(), SRC);
        assert_eq!(ip.get_destination(), DST);
        assert_eq!(ip.get_next_level_protocol(), IpNextHeaderProtocols::Tcp);
        assert_eq!(ip.get_total_length(), 40);
        assert_eq!(ipv4::checksum(&ip), ip.get_checksum());

        let tcp = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(tcp.get_source(), 50053);
        assert_eq!(tcp.get_destination(), 80);
        assert_eq!(tcp.get_flags(), TcpFlags::SYN);
    }

    #[test]
    fn test_ipv4_probe_tcp_checksum() {
        let buffer = build_ipv4_probe(SRC, DST, 50053, 443, TcpProbeKind::Ack).unwrap();
        let tcp = TcpPacket::new(&buffer[20..]).unwrap();
        assert_eq!(ipv4_checksum(&tcp, &SRC, &DST), tcp.get_checksum());
    }

    #[test]
    fn test_ack_probe_flags_and_ack_number() {
        let buffer = build_ipv4_probe(SRC, DST, 50053, 80, TcpProbeKind::Ack).unwrap();
        let tcp = TcpPacket::new(&buffer[20..]).unwrap();
        assert_eq!(tcp.get_flags(), TcpFlags::ACK);
    }

    #[test]
    fn test_syn_probe_zero_ack() {
        let buffer = build_ipv4_probe(SRC, DST, 50053, 80, TcpProbeKind::Syn).unwrap();
        let tcp = TcpPacket::new(&buffer[20..]).unwrap();
        assert_eq!(tcp.get_acknowledgement(), 0);
    }

    #[test]
    fn test_ipv6_segment() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let buffer = build_ipv6_segment(src, dst, 50053, 8081, TcpProbeKind::Syn).unwrap();
        assert_eq!(buffer.len(), 20);

        let tcp = TcpPacket::new(&buffer).unwrap();
        assert_eq!(tcp.get_destination(), 8081);
        assert_eq!(tcp.get_data_offset(), 5);
        assert_eq!(ipv6_checksum(&tcp, &src, &dst), tcp.get_checksum());
    }

    #[test]
    fn test_probe_kind_display() {
        assert_eq!(TcpProbeKind::Syn.to_string(), "SYN");
        assert_eq!(TcpProbeKind::Ack.to_string(), "ACK");
    }
}
