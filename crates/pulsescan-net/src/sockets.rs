//! Socket factory for the probe emitter
//!
//! Opens the minimum socket set for the selected methods and holds it for
//! the scan's lifetime: raw ICMP transport channels for echo probes, a
//! header-included raw IPv4 socket plus a raw IPv6 socket for TCP probes,
//! connected-UDP sockets for source-address/route selection, and a
//! link-layer channel (with the interface's ARP parameters) for ARP.
//!
//! Opening is all-or-nothing: the first failure is returned as an error
//! naming the socket kind, and everything opened before it is released by
//! drop.

use crate::interface::{find_capture_interface, ArpContext};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::transport::{
    transport_channel, TransportChannelType, TransportProtocol, TransportSender,
};
use pnet_datalink::{Channel, DataLinkSender};
use pulsescan_core::{AliveTestMethods, Error, Result};
use std::fmt;
use std::net::{IpAddr, UdpSocket};
use tracing::{debug, warn};

/// Transport buffer size for raw channels
const CHANNEL_BUFFER: usize = 4096;

/// Destination port for the UDP route probe (never actually sent to)
const ROUTE_PROBE_PORT: u16 = 9;

/// The socket kinds the factory can open, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    IcmpV4,
    IcmpV6,
    TcpV4,
    TcpV6,
    UdpV4,
    UdpV6,
    Arp,
    NeighborDiscovery,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketKind::IcmpV4 => "ICMPv4",
            SocketKind::IcmpV6 => "ICMPv6",
            SocketKind::TcpV4 => "TCPv4",
            SocketKind::TcpV6 => "TCPv6",
            SocketKind::UdpV4 => "UDPv4",
            SocketKind::UdpV6 => "UDPv6",
            SocketKind::Arp => "ARP",
            SocketKind::NeighborDiscovery => "ICMPv6-ND",
        };
        write!(f, "{}", name)
    }
}

/// The open socket set for one scan
pub struct ProbeSockets {
    icmp_v4: Option<TransportSender>,
    icmp_v6: Option<TransportSender>,
    tcp_v4: Option<TransportSender>,
    tcp_v6: Option<TransportSender>,
    udp_v4: Option<UdpSocket>,
    udp_v6: Option<UdpSocket>,
    arp_tx: Option<Box<dyn DataLinkSender>>,
    arp_ctx: Option<ArpContext>,
    nd_v6: Option<TransportSender>,
}

impl ProbeSockets {
    /// Open the sockets the selected methods require
    pub fn open(methods: AliveTestMethods, interface: Option<&str>) -> Result<Self> {
        let mut sockets = Self {
            icmp_v4: None,
            icmp_v6: None,
            tcp_v4: None,
            tcp_v6: None,
            udp_v4: None,
            udp_v6: None,
            arp_tx: None,
            arp_ctx: None,
            nd_v6: None,
        };

        if methods.has(AliveTestMethods::ICMP) {
            sockets.icmp_v4 = Some(open_transport(
                SocketKind::IcmpV4,
                TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp)),
            )?);
            sockets.icmp_v6 = Some(open_transport(
                SocketKind::IcmpV6,
                TransportChannelType::Layer4(TransportProtocol::Ipv6(
                    IpNextHeaderProtocols::Icmpv6,
                )),
            )?);
        }

        if methods.has(AliveTestMethods::TCP_SYN) || methods.has(AliveTestMethods::TCP_ACK) {
            // IPv4 probes carry their own IP header
            sockets.tcp_v4 = Some(open_transport(
                SocketKind::TcpV4,
                TransportChannelType::Layer3(IpNextHeaderProtocols::Tcp),
            )?);
            sockets.tcp_v6 = Some(open_transport(
                SocketKind::TcpV6,
                TransportChannelType::Layer4(TransportProtocol::Ipv6(IpNextHeaderProtocols::Tcp)),
            )?);
            sockets.udp_v4 = Some(
                UdpSocket::bind(("0.0.0.0", 0))
                    .map_err(|e| open_error(SocketKind::UdpV4, &e.to_string()))?,
            );
            sockets.udp_v6 = Some(
                UdpSocket::bind(("::", 0))
                    .map_err(|e| open_error(SocketKind::UdpV6, &e.to_string()))?,
            );
        }

        if methods.has(AliveTestMethods::ARP) {
            let iface = find_capture_interface(interface)
                .map_err(|e| open_error(SocketKind::Arp, &e.to_string()))?;

            match ArpContext::from_interface(&iface) {
                Ok(ctx) => sockets.arp_ctx = Some(ctx),
                // an IPv6-only interface can still do Neighbor Discovery
                Err(e) => warn!("ARP requests disabled: {}", e),
            }

            let (tx, _rx) = match pnet_datalink::channel(&iface, Default::default()) {
                Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
                Ok(_) => {
                    return Err(open_error(SocketKind::Arp, "unsupported channel type"));
                }
                Err(e) => return Err(open_error(SocketKind::Arp, &e.to_string())),
            };
            sockets.arp_tx = Some(tx);

            sockets.nd_v6 = Some(open_transport(
                SocketKind::NeighborDiscovery,
                TransportChannelType::Layer4(TransportProtocol::Ipv6(
                    IpNextHeaderProtocols::Icmpv6,
                )),
            )?);
            debug!("ARP/ND sockets opened on {}", iface.name);
        }

        Ok(sockets)
    }

    pub fn icmp_v4(&mut self) -> Result<&mut TransportSender> {
        self.icmp_v4.as_mut().ok_or_else(|| missing(SocketKind::IcmpV4))
    }

    pub fn icmp_v6(&mut self) -> Result<&mut TransportSender> {
        self.icmp_v6.as_mut().ok_or_else(|| missing(SocketKind::IcmpV6))
    }

    pub fn tcp_v4(&mut self) -> Result<&mut TransportSender> {
        self.tcp_v4.as_mut().ok_or_else(|| missing(SocketKind::TcpV4))
    }

    pub fn tcp_v6(&mut self) -> Result<&mut TransportSender> {
        self.tcp_v6.as_mut().ok_or_else(|| missing(SocketKind::TcpV6))
    }

    pub fn nd_v6(&mut self) -> Result<&mut TransportSender> {
        self.nd_v6
            .as_mut()
            .ok_or_else(|| missing(SocketKind::NeighborDiscovery))
    }

    /// Link-layer sender for ARP request frames
    pub fn arp_sender(&mut self) -> Result<&mut Box<dyn DataLinkSender>> {
        self.arp_tx.as_mut().ok_or_else(|| missing(SocketKind::Arp))
    }

    /// ARP parameters of the link-layer interface
    ///
    /// `None` when the sender is open but the interface is not ARP-capable
    /// (no MAC or no IPv4 address).
    pub fn arp_context(&self) -> Option<&ArpContext> {
        self.arp_ctx.as_ref()
    }

    /// Resolve the source address the kernel would use towards `target`
    ///
    /// Connects the held UDP socket of the matching family (nothing is
    /// sent) and reads the local address back.
    pub fn resolve_source(&self, target: IpAddr) -> Result<IpAddr> {
        let socket = match target {
            IpAddr::V4(_) => self.udp_v4.as_ref().ok_or_else(|| missing(SocketKind::UdpV4))?,
            IpAddr::V6(_) => self.udp_v6.as_ref().ok_or_else(|| missing(SocketKind::UdpV6))?,
        };
        socket.connect((target, ROUTE_PROBE_PORT))?;
        Ok(socket.local_addr()?.ip())
    }
}

fn open_transport(kind: SocketKind, channel: TransportChannelType) -> Result<TransportSender> {
    match transport_channel(CHANNEL_BUFFER, channel) {
        // the receiver shares the sender's descriptor; replies flow through
        // the capture path instead
        Ok((tx, _rx)) => Ok(tx),
        Err(e) => Err(open_error(kind, &e.to_string())),
    }
}

fn open_error(kind: SocketKind, detail: &str) -> Error {
    Error::Network(format!("cannot open {} socket: {}", kind, detail))
}

fn missing(kind: SocketKind) -> Error {
    Error::Network(format!("{} socket not open", kind))
}
