//! Probe emitter
//!
//! Runs on the main thread and walks the target set once per enabled
//! method, crafting and sending one probe per target (one per target and
//! port for TCP). Emission is best-effort: a failed send or an unresolvable
//! route skips forward, never aborts the scan. The alive-cap flag is
//! checked before every packet; once latched the current pass and every
//! remaining pass stop.

use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pulsescan_core::{Error, Result, Target, TargetSet};
use pulsescan_net::icmpv6::solicited_node_multicast;
use pulsescan_net::{arp, icmp, icmpv6, tcp, ProbeSockets, TcpProbeKind};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Emissions per burst before the pacer sleeps
pub const BURST: u64 = 100;

/// Pause between bursts
pub const BURST_TIMEOUT: Duration = Duration::from_millis(100);

/// Fixed-count-then-sleep rate limiter, scoped to one method pass
pub(crate) struct Pacer {
    count: u64,
}

impl Pacer {
    pub(crate) fn new() -> Self {
        Self { count: 0 }
    }

    /// Count one emission; returns true when the burst is full and the
    /// caller should pause
    pub(crate) fn tick(&mut self) -> bool {
        self.count += 1;
        self.count % BURST == 0
    }
}

/// Crafts and sends liveness probes over the scan's socket set
pub struct ProbeEmitter<'a> {
    sockets: &'a mut ProbeSockets,
    tcp_ports: Vec<u16>,
    tcp_probe_port: u16,
    alive_cap: Arc<AtomicBool>,
    probed: HashSet<String>,
}

impl<'a> ProbeEmitter<'a> {
    pub fn new(
        sockets: &'a mut ProbeSockets,
        tcp_ports: Vec<u16>,
        tcp_probe_port: u16,
        alive_cap: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sockets,
            tcp_ports,
            tcp_probe_port,
            alive_cap,
            probed: HashSet::new(),
        }
    }

    /// Whether the alive cap has latched and emission must halt
    pub fn halted(&self) -> bool {
        self.alive_cap.load(Ordering::Relaxed)
    }

    /// Targets that received at least one probe
    pub fn probed_count(&self) -> usize {
        self.probed.len()
    }

    /// One TCP pass: every (target, port) pair with the given flag
    pub fn tcp_pass(&mut self, targets: &TargetSet, kind: TcpProbeKind) -> Result<()> {
        debug!(flag = %kind, ports = self.tcp_ports.len(), "TCP probe pass");
        let mut pacer = Pacer::new();

        for target in targets.iter() {
            if self.halted() {
                debug!("alive cap reached, stopping TCP pass");
                return Ok(());
            }
            self.probed.insert(target.canonical().to_string());

            let source = match self.sockets.resolve_source(target.addr()) {
                Ok(source) => source,
                Err(e) => {
                    warn!(host = %target, "no route for TCP probe: {}", e);
                    continue;
                }
            };

            let ports = self.tcp_ports.clone();
            for port in ports {
                if self.halted() {
                    debug!("alive cap reached, stopping TCP pass");
                    return Ok(());
                }
                self.send_tcp_probe(target, source, port, kind);
                if pacer.tick() {
                    thread::sleep(BURST_TIMEOUT);
                }
            }
        }
        Ok(())
    }

    fn send_tcp_probe(&mut self, target: &Target, source: IpAddr, port: u16, kind: TcpProbeKind) {
        let result = match (target.addr(), source) {
            (IpAddr::V4(dst), IpAddr::V4(src)) => {
                tcp::build_ipv4_probe(src, dst, self.tcp_probe_port, port, kind).and_then(|buf| {
                    let packet = Ipv4Packet::new(&buf)
                        .ok_or_else(|| Error::Network("short TCP probe".to_string()))?;
                    let sender = self.sockets.tcp_v4()?;
                    sender.send_to(packet, IpAddr::V4(dst))?;
                    Ok(())
                })
            }
            (IpAddr::V6(dst), IpAddr::V6(src)) => {
                tcp::build_ipv6_segment(src, dst, self.tcp_probe_port, port, kind).and_then(
                    |buf| {
                        let packet = TcpPacket::new(&buf)
                            .ok_or_else(|| Error::Network("short TCP probe".to_string()))?;
                        let sender = self.sockets.tcp_v6()?;
                        sender.send_to(packet, IpAddr::V6(dst))?;
                        Ok(())
                    },
                )
            }
            _ => Err(Error::Network("address family mismatch".to_string())),
        };

        match result {
            Ok(()) => trace!(host = %target, port, "TCP probe sent"),
            Err(e) => debug!(host = %target, port, "TCP probe failed: {}", e),
        }
    }

    /// One ICMP pass: an echo request per target
    pub fn icmp_pass(&mut self, targets: &TargetSet) -> Result<()> {
        debug!("ICMP probe pass");
        let mut pacer = Pacer::new();

        for target in targets.iter() {
            if self.halted() {
                debug!("alive cap reached, stopping ICMP pass");
                return Ok(());
            }
            self.probed.insert(target.canonical().to_string());

            let result = match target.addr() {
                IpAddr::V4(dst) => icmp::build_echo_request().and_then(|buf| {
                    let packet = IcmpPacket::new(&buf)
                        .ok_or_else(|| Error::Network("short echo request".to_string()))?;
                    let sender = self.sockets.icmp_v4()?;
                    sender.send_to(packet, IpAddr::V4(dst))?;
                    Ok(())
                }),
                IpAddr::V6(dst) => {
                    icmpv6::build_echo_request(Ipv6Addr::UNSPECIFIED, dst).and_then(|buf| {
                        let packet = Icmpv6Packet::new(&buf)
                            .ok_or_else(|| Error::Network("short echo request".to_string()))?;
                        let sender = self.sockets.icmp_v6()?;
                        sender.send_to(packet, IpAddr::V6(dst))?;
                        Ok(())
                    })
                }
            };

            match result {
                Ok(()) => trace!(host = %target, "echo request sent"),
                Err(e) => debug!(host = %target, "echo request failed: {}", e),
            }

            if pacer.tick() {
                thread::sleep(BURST_TIMEOUT);
            }
        }
        Ok(())
    }

    /// One ARP/ND pass: ARP requests for on-link IPv4 targets, Neighbor
    /// Solicitations for IPv6 targets
    pub fn arp_pass(&mut self, targets: &TargetSet) -> Result<()> {
        debug!("ARP/ND probe pass");
        let mut pacer = Pacer::new();
        let arp_ctx = self.sockets.arp_context().cloned();
        let source_ll = arp_ctx.as_ref().map(|ctx| ctx.src_mac.octets());

        for target in targets.iter() {
            if self.halted() {
                debug!("alive cap reached, stopping ARP pass");
                return Ok(());
            }
            self.probed.insert(target.canonical().to_string());

            match target.addr() {
                IpAddr::V4(dst) => {
                    let Some(ctx) = arp_ctx.as_ref() else {
                        trace!(host = %target, "interface not ARP-capable, skipping");
                        continue;
                    };
                    if !ctx.on_link(dst) {
                        trace!(host = %target, "target off-link, skipping ARP");
                        continue;
                    }
                    let result = arp::build_arp_request(ctx.src_mac, ctx.src_ip, dst)
                        .and_then(|frame| {
                            let sender = self.sockets.arp_sender()?;
                            match sender.send_to(&frame, None) {
                                Some(Ok(())) => Ok(()),
                                Some(Err(e)) => Err(e.into()),
                                None => Err(Error::Network("link-layer send failed".to_string())),
                            }
                        });
                    match result {
                        Ok(()) => trace!(host = %target, "ARP request sent"),
                        Err(e) => debug!(host = %target, "ARP request failed: {}", e),
                    }
                }
                IpAddr::V6(dst) => {
                    let group = solicited_node_multicast(dst);
                    let result =
                        icmpv6::build_neighbor_solicitation(dst, source_ll, Ipv6Addr::UNSPECIFIED)
                            .and_then(|buf| {
                                let packet = Icmpv6Packet::new(&buf).ok_or_else(|| {
                                    Error::Network("short solicitation".to_string())
                                })?;
                                let sender = self.sockets.nd_v6()?;
                                sender.send_to(packet, IpAddr::V6(group))?;
                                Ok(())
                            });
                    match result {
                        Ok(()) => trace!(host = %target, "neighbor solicitation sent"),
                        Err(e) => debug!(host = %target, "neighbor solicitation failed: {}", e),
                    }
                }
            }

            if pacer.tick() {
                thread::sleep(BURST_TIMEOUT);
            }
        }
        Ok(())
    }
}
