//! Sniffer behaviour against scripted capture traffic
//!
//! These tests drive the sniffer thread directly with crafted frames and
//! verify classification, deduplication, and quota accounting without
//! touching the network.

mod common;

use common::{
    arp_reply_frame, echo_reply_frame, echo_reply_frame_v6, init_tracing, tcp_reply_frame,
    wait_for_drain, FakeCapture,
};
use pulsescan_core::{EngineConfig, TargetSet, UNLIMITED_HOSTS};
use pulsescan_engine::{
    sniffer, FinishLatch, MemoryQueue, QueueMessage, RestrictionTracker, ScanReport,
};
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

const PROBE_PORT: u16 = 50053;

fn target_set(addrs: &[&str]) -> TargetSet {
    addrs
        .iter()
        .map(|s| s.parse::<IpAddr>().unwrap())
        .collect()
}

/// Spawn a sniffer over scripted frames, let it drain them, and collect
/// the report plus everything that reached the queue.
fn replay(
    frames: Vec<Vec<u8>>,
    targets: TargetSet,
    max_scan_hosts: u64,
    max_alive_hosts: u64,
) -> (ScanReport, Arc<MemoryQueue>, Arc<FinishLatch>) {
    let queue = MemoryQueue::new();
    let finish = FinishLatch::new(queue.clone());
    let alive_cap = Arc::new(AtomicBool::new(false));
    let config = EngineConfig {
        max_scan_hosts,
        max_alive_hosts,
        ..EngineConfig::default()
    };
    let tracker = RestrictionTracker::new(&config, queue.clone(), finish.clone(), alive_cap);

    let (capture, remaining) = FakeCapture::with_frames(frames);
    let handle = sniffer::spawn(capture, Arc::new(targets), tracker, PROBE_PORT).unwrap();

    wait_for_drain(&remaining);
    let report = handle.wait(Duration::from_secs(2));

    // the returned latch keeps the finish signal unfired, so any finish on
    // the queue came from quota accounting
    (report, queue, finish)
}

#[test]
fn test_two_live_one_dead() {
    init_tracing();
    let frames = vec![
        echo_reply_frame("10.0.0.1".parse().unwrap()),
        echo_reply_frame("10.0.0.3".parse().unwrap()),
    ];
    let (report, queue, _latch) = replay(
        frames,
        target_set(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]),
        UNLIMITED_HOSTS,
        UNLIMITED_HOSTS,
    );

    assert_eq!(queue.hosts(), vec!["10.0.0.1", "10.0.0.3"]);
    assert_eq!(queue.finish_count(), 0);
    assert!(report.alive.contains("10.0.0.1"));
    assert!(report.alive.contains("10.0.0.3"));
    assert!(!report.alive.contains("10.0.0.2"));
    assert_eq!(report.alive_count, 2);
}

#[test]
fn test_duplicate_replies_observed_once() {
    let src: std::net::Ipv4Addr = "10.0.0.1".parse().unwrap();
    let frames = vec![
        echo_reply_frame(src),
        echo_reply_frame(src),
        echo_reply_frame(src),
    ];
    let (report, queue, _latch) = replay(
        frames,
        target_set(&["10.0.0.1"]),
        UNLIMITED_HOSTS,
        UNLIMITED_HOSTS,
    );

    assert_eq!(queue.hosts(), vec!["10.0.0.1"]);
    assert_eq!(report.alive_count, 1);
}

#[test]
fn test_scan_cap_publishes_in_arrival_order_then_finishes() {
    let addrs = ["10.0.1.1", "10.0.1.2", "10.0.1.3", "10.0.1.4", "10.0.1.5"];
    let frames = addrs
        .iter()
        .map(|a| echo_reply_frame(a.parse().unwrap()))
        .collect();
    let (report, queue, _latch) = replay(frames, target_set(&addrs), 2, UNLIMITED_HOSTS);

    assert_eq!(
        queue.messages(),
        vec![
            QueueMessage::Host("10.0.1.1".to_string()),
            QueueMessage::Host("10.0.1.2".to_string()),
            QueueMessage::Finish,
        ]
    );
    assert!(report.scan_cap_reached);
    assert_eq!(report.suppressed.len(), 3);
    assert!(report.suppressed.contains("10.0.1.3"));
    assert_eq!(report.alive_count, 5);
}

#[test]
fn test_alive_cap_latches_during_capture() {
    let addrs = ["10.0.2.1", "10.0.2.2", "10.0.2.3", "10.0.2.4"];
    let frames = addrs
        .iter()
        .map(|a| echo_reply_frame(a.parse().unwrap()))
        .collect();
    let (report, _queue, _latch) = replay(frames, target_set(&addrs), UNLIMITED_HOSTS, 3);

    assert!(report.alive_cap_reached);
    assert!(!report.scan_cap_reached);
}

#[test]
fn test_non_target_replies_recorded_but_not_published() {
    let frames = vec![echo_reply_frame("172.16.0.9".parse().unwrap())];
    let (report, queue, _latch) = replay(
        frames,
        target_set(&["10.0.0.1"]),
        UNLIMITED_HOSTS,
        UNLIMITED_HOSTS,
    );

    assert!(queue.hosts().is_empty());
    assert_eq!(report.alive_count, 0);
    // the reply source was still recorded as seen
    assert!(report.alive.contains("172.16.0.9"));
}

#[test]
fn test_ipv6_reply_extracted_and_matched() {
    let frames = vec![echo_reply_frame_v6("2001:db8::7".parse().unwrap())];
    let (report, queue, _latch) = replay(
        frames,
        target_set(&["2001:db8::7", "192.0.2.1"]),
        UNLIMITED_HOSTS,
        UNLIMITED_HOSTS,
    );

    assert_eq!(queue.hosts(), vec!["2001:db8::7"]);
    assert_eq!(report.alive_count, 1);
}

#[test]
fn test_tcp_and_arp_replies_match() {
    let frames = vec![
        tcp_reply_frame("10.0.3.1".parse().unwrap(), PROBE_PORT),
        arp_reply_frame("10.0.3.2".parse().unwrap()),
        // TCP to a foreign port must not match
        tcp_reply_frame("10.0.3.3".parse().unwrap(), 22),
    ];
    let (report, queue, _latch) = replay(
        frames,
        target_set(&["10.0.3.1", "10.0.3.2", "10.0.3.3"]),
        UNLIMITED_HOSTS,
        UNLIMITED_HOSTS,
    );

    assert_eq!(queue.hosts(), vec!["10.0.3.1", "10.0.3.2"]);
    assert!(!report.alive.contains("10.0.3.3"));
}

#[test]
fn test_frame_injected_right_after_spawn_is_classified() {
    // spawn() returns only once the capture loop is armed, so a frame
    // already queued at that moment cannot be lost
    let queue = MemoryQueue::new();
    let finish = FinishLatch::new(queue.clone());
    let alive_cap = Arc::new(AtomicBool::new(false));
    let config = EngineConfig::default();
    let tracker = RestrictionTracker::new(&config, queue.clone(), finish, alive_cap);

    let (capture, remaining) =
        FakeCapture::with_frames(vec![echo_reply_frame("10.0.4.1".parse().unwrap())]);
    let handle = sniffer::spawn(
        capture,
        Arc::new(target_set(&["10.0.4.1"])),
        tracker,
        PROBE_PORT,
    )
    .unwrap();

    wait_for_drain(&remaining);
    let report = handle.wait(Duration::from_secs(2));

    assert_eq!(queue.hosts(), vec!["10.0.4.1"]);
    assert_eq!(report.alive_count, 1);
}
