//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet::packet::icmp::{IcmpType, MutableIcmpPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags};
use pnet::util::MacAddr;
use pulsescan_core::{Error, Result};
use pulsescan_engine::HostQueue;
use pulsescan_net::ReplyCapture;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Capture implementation replaying a scripted frame sequence
///
/// The shared counter exposes how many frames are still queued so tests
/// can wait for the sniffer to consume them before breaking the loop.
pub struct FakeCapture {
    frames: Mutex<VecDeque<Vec<u8>>>,
    remaining: Arc<AtomicUsize>,
    fail_open: bool,
}

impl FakeCapture {
    pub fn with_frames(frames: Vec<Vec<u8>>) -> (Box<Self>, Arc<AtomicUsize>) {
        let remaining = Arc::new(AtomicUsize::new(frames.len()));
        let capture = Box::new(Self {
            frames: Mutex::new(frames.into()),
            remaining: remaining.clone(),
            fail_open: false,
        });
        (capture, remaining)
    }

    pub fn failing_open() -> Box<Self> {
        Box::new(Self {
            frames: Mutex::new(VecDeque::new()),
            remaining: Arc::new(AtomicUsize::new(0)),
            fail_open: true,
        })
    }
}

impl ReplyCapture for FakeCapture {
    fn open(&mut self, _interface: Option<&str>) -> Result<()> {
        if self.fail_open {
            return Err(Error::Network("scripted capture open failure".to_string()));
        }
        Ok(())
    }

    fn next_frame(&mut self, timeout_ms: u64) -> Result<Option<Vec<u8>>> {
        match self.frames.lock().pop_front() {
            Some(frame) => {
                self.remaining.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(frame))
            }
            None => {
                // idle poll; keep it short so tests stay fast
                std::thread::sleep(Duration::from_millis(timeout_ms.min(5)));
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opt-in test logging: `RUST_LOG=debug cargo test -- --nocapture`
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Wait until the sniffer has drained the scripted frames
pub fn wait_for_drain(remaining: &AtomicUsize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while remaining.load(Ordering::SeqCst) > 0 {
        assert!(
            std::time::Instant::now() < deadline,
            "sniffer did not consume scripted frames in time"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
    // last frame may still be inside the classifier
    std::thread::sleep(Duration::from_millis(30));
}

fn ethernet_frame(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 14 + payload.len()];
    {
        let mut ethernet = MutableEthernetPacket::new(&mut frame).unwrap();
        ethernet.set_destination(MacAddr::new(2, 0, 0, 0, 0, 1));
        ethernet.set_source(MacAddr::new(2, 0, 0, 0, 0, 2));
        ethernet.set_ethertype(ethertype);
    }
    frame[14..].copy_from_slice(payload);
    frame
}

fn ipv4_frame(src: Ipv4Addr, protocol: IpNextHeaderProtocol, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; 20 + payload.len()];
    {
        let mut ip = MutableIpv4Packet::new(&mut buffer).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((20 + payload.len()) as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(protocol);
        ip.set_source(src);
        ip.set_destination(Ipv4Addr::new(192, 0, 2, 99));
    }
    buffer[20..].copy_from_slice(payload);
    ethernet_frame(EtherTypes::Ipv4, &buffer)
}

/// ICMPv4 echo reply frame from `src`
pub fn echo_reply_frame(src: Ipv4Addr) -> Vec<u8> {
    let mut icmp = vec![0u8; 8];
    MutableIcmpPacket::new(&mut icmp)
        .unwrap()
        .set_icmp_type(IcmpType(0));
    ipv4_frame(src, IpNextHeaderProtocols::Icmp, &icmp)
}

/// ICMPv6 echo reply (type 129) frame from `src`
pub fn echo_reply_frame_v6(src: Ipv6Addr) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload[0] = 129;

    let mut buffer = vec![0u8; 40 + payload.len()];
    {
        let mut ip = MutableIpv6Packet::new(&mut buffer).unwrap();
        ip.set_version(6);
        ip.set_payload_length(payload.len() as u16);
        ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
        ip.set_hop_limit(64);
        ip.set_source(src);
        ip.set_destination("2001:db8::99".parse().unwrap());
    }
    buffer[40..].copy_from_slice(&payload);
    ethernet_frame(EtherTypes::Ipv6, &buffer)
}

/// TCP RST/ACK-style response frame from `src` to our probe source port
pub fn tcp_reply_frame(src: Ipv4Addr, probe_port: u16) -> Vec<u8> {
    let mut tcp = vec![0u8; 20];
    {
        let mut packet = MutableTcpPacket::new(&mut tcp).unwrap();
        packet.set_source(80);
        packet.set_destination(probe_port);
        packet.set_data_offset(5);
        packet.set_flags(TcpFlags::RST | TcpFlags::ACK);
    }
    ipv4_frame(src, IpNextHeaderProtocols::Tcp, &tcp)
}

/// ARP reply frame with `sender` as the sender protocol address
pub fn arp_reply_frame(sender: Ipv4Addr) -> Vec<u8> {
    let mut buffer = vec![0u8; 28];
    {
        let mut arp = MutableArpPacket::new(&mut buffer).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Reply);
        arp.set_sender_hw_addr(MacAddr::new(2, 0, 0, 0, 0, 7));
        arp.set_sender_proto_addr(sender);
        arp.set_target_hw_addr(MacAddr::new(2, 0, 0, 0, 0, 1));
        arp.set_target_proto_addr(Ipv4Addr::new(192, 0, 2, 99));
    }
    ethernet_frame(EtherTypes::Arp, &buffer)
}

/// Queue whose auxiliary channel always fails
///
/// Host and finish messages are recorded; status pushes error out, which
/// must not stop a scan from completing.
#[derive(Default)]
pub struct BrokenStatusQueue {
    pub inner: pulsescan_engine::MemoryQueue,
}

impl BrokenStatusQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl HostQueue for BrokenStatusQueue {
    fn push_host(&self, ip: &str) -> Result<()> {
        self.inner.push_host(ip)
    }

    fn push_finish(&self) -> Result<()> {
        self.inner.push_finish()
    }

    fn push_status(&self, _message: &str) -> Result<()> {
        Err(Error::Queue("auxiliary channel unavailable".to_string()))
    }
}
