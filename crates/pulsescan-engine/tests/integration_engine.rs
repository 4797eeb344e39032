//! End-to-end scan runs through the orchestrator

mod common;

use common::{echo_reply_frame, init_tracing, BrokenStatusQueue, FakeCapture};
use pulsescan_core::{AliveTestMethods, EngineConfig, EngineTiming, TargetSet};
use pulsescan_engine::{dead_host_message, MemoryQueue, QueueMessage, ScanOrchestrator};
use std::net::IpAddr;

fn target_set(addrs: &[&str]) -> TargetSet {
    addrs
        .iter()
        .map(|s| s.parse::<IpAddr>().unwrap())
        .collect()
}

fn consider_alive_config() -> EngineConfig {
    EngineConfig {
        methods: AliveTestMethods::CONSIDER_ALIVE,
        ..EngineConfig::default()
    }
}

/// Timing suitable for tests: no multi-second settles and drains
fn fast_timing() -> EngineTiming {
    EngineTiming {
        settle_ms: 20,
        drain_ms: 300,
        stop_grace_ms: 2_000,
    }
}

#[test]
fn test_consider_alive_publishes_every_target_in_order() {
    init_tracing();
    let queue = MemoryQueue::new();
    let orchestrator = ScanOrchestrator::new(
        consider_alive_config(),
        target_set(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]),
        queue.clone(),
    );

    let summary = orchestrator.run().unwrap();

    assert_eq!(
        queue.messages(),
        vec![
            QueueMessage::Host("10.0.0.1".to_string()),
            QueueMessage::Host("10.0.0.2".to_string()),
            QueueMessage::Host("10.0.0.3".to_string()),
            QueueMessage::Status(dead_host_message(0)),
            QueueMessage::Finish,
        ]
    );
    assert_eq!(summary.targets, 3);
    assert_eq!(summary.alive, 3);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.dead, 0);
}

#[test]
fn test_consider_alive_respects_scan_cap() {
    let queue = MemoryQueue::new();
    let config = EngineConfig {
        max_scan_hosts: 2,
        ..consider_alive_config()
    };
    let orchestrator = ScanOrchestrator::new(
        config,
        target_set(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]),
        queue.clone(),
    );

    let summary = orchestrator.run().unwrap();

    // the cap-filling observe published the finish signal early; the
    // orchestrator's own terminal signal folds into the same latch
    assert_eq!(queue.hosts(), vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(queue.finish_count(), 1);
    assert!(queue.statuses().contains(&dead_host_message(3)));
    assert_eq!(summary.published, 2);
    assert_eq!(summary.suppressed, 3);
    assert_eq!(summary.dead, 3);
}

#[test]
fn test_init_failure_still_publishes_finish() {
    let queue = MemoryQueue::new();
    let config = EngineConfig {
        methods: AliveTestMethods::ICMP,
        interface: Some("definitely-not-a-real-iface0".to_string()),
        timing: fast_timing(),
        ..EngineConfig::default()
    };
    let orchestrator = ScanOrchestrator::new(config, target_set(&["192.0.2.1"]), queue.clone());

    // fails either at the privilege preflight or when opening the capture
    // interface; both are init failures
    let result = orchestrator.run();
    assert!(result.is_err());

    assert!(queue.hosts().is_empty());
    assert_eq!(queue.finish_count(), 1);
}

#[test]
fn test_capture_open_failure_is_init_failure() {
    let queue = MemoryQueue::new();
    let config = EngineConfig {
        methods: AliveTestMethods::ICMP,
        timing: fast_timing(),
        ..EngineConfig::default()
    };
    let orchestrator = ScanOrchestrator::new(config, target_set(&["192.0.2.1"]), queue.clone())
        .with_capture(FakeCapture::failing_open());

    let result = orchestrator.run();
    assert!(result.is_err());
    assert!(queue.hosts().is_empty());
    assert_eq!(queue.finish_count(), 1);
}

#[test]
fn test_broken_auxiliary_channel_does_not_fail_the_scan() {
    let queue = BrokenStatusQueue::new();
    let orchestrator = ScanOrchestrator::new(
        consider_alive_config(),
        target_set(&["10.0.0.1"]),
        queue.clone(),
    );

    let summary = orchestrator.run().unwrap();

    assert_eq!(summary.published, 1);
    assert_eq!(queue.inner.hosts(), vec!["10.0.0.1"]);
    assert_eq!(queue.inner.finish_count(), 1);
}

#[test]
fn test_probing_scan_with_scripted_replies() {
    // The full probing path needs raw sockets (CAP_NET_RAW). When the test
    // environment cannot grant them, the init-failure contract is checked
    // instead.
    let queue = MemoryQueue::new();
    let config = EngineConfig {
        methods: AliveTestMethods::ICMP,
        timing: fast_timing(),
        ..EngineConfig::default()
    };
    let (capture, _remaining) = FakeCapture::with_frames(vec![
        echo_reply_frame("192.0.2.1".parse().unwrap()),
        echo_reply_frame("192.0.2.3".parse().unwrap()),
    ]);
    let orchestrator = ScanOrchestrator::new(
        config,
        target_set(&["192.0.2.1", "192.0.2.2", "192.0.2.3"]),
        queue.clone(),
    )
    .with_capture(capture);

    match orchestrator.run() {
        Ok(summary) => {
            assert_eq!(queue.hosts(), vec!["192.0.2.1", "192.0.2.3"]);
            assert!(queue.statuses().contains(&dead_host_message(1)));
            assert_eq!(summary.alive, 2);
            assert_eq!(summary.dead, 1);
            assert_eq!(queue.finish_count(), 1);
        }
        Err(_) => {
            // unprivileged environment: no hosts, exactly one finish
            assert!(queue.hosts().is_empty());
            assert_eq!(queue.finish_count(), 1);
        }
    }
}
