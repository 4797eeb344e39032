//! Scan orchestration
//!
//! Drives one liveness scan through its phases:
//!
//! ```text
//! INIT -> SNIFFER_STARTING -> PROBING -> DRAINING -> STOPPING -> DONE
//!                                  |
//!                                  +-- (alive cap) skip to DRAINING
//! ```
//!
//! The main thread performs every phase itself and is the sole probe
//! emitter; the sniffer runs on its own thread between SNIFFER_STARTING
//! and STOPPING. Whatever happens (normal completion, setup failure,
//! cancellation, cleanup failure) exactly one finish sentinel reaches the
//! downstream queue.

use crate::emitter::ProbeEmitter;
use crate::queue::{dead_host_message, error_message, FinishLatch, HostQueue};
use crate::restrictions::{RestrictionTracker, ScanReport};
use crate::sniffer;
use pulsescan_core::{AliveTestMethods, EngineConfig, Result, TargetSet};
use pulsescan_net::{check_privileges, create_capture, ProbeSockets, ReplyCapture, TcpProbeKind};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Final counts of one scan run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Size of the target set
    pub targets: usize,
    /// Targets observed alive (including suppressed ones)
    pub alive: u64,
    /// Hosts actually published to the downstream queue
    pub published: u64,
    /// Alive targets withheld because the scan cap was reached
    pub suppressed: usize,
    /// Targets reported dead downstream (suppressed hosts count as dead)
    pub dead: usize,
}

/// Owns and coordinates one scan's resources
pub struct ScanOrchestrator {
    config: EngineConfig,
    targets: Arc<TargetSet>,
    queue: Arc<dyn HostQueue>,
    capture_override: Option<Box<dyn ReplyCapture>>,
}

impl ScanOrchestrator {
    pub fn new(config: EngineConfig, targets: TargetSet, queue: Arc<dyn HostQueue>) -> Self {
        Self {
            config,
            targets: Arc::new(targets),
            queue,
            capture_override: None,
        }
    }

    /// Replace the platform capture implementation
    ///
    /// Used by integration tests to feed the sniffer scripted frames.
    pub fn with_capture(mut self, capture: Box<dyn ReplyCapture>) -> Self {
        self.capture_override = Some(capture);
        self
    }

    /// Run the scan to completion
    ///
    /// The finish sentinel is published on every exit path, including
    /// errors and panics (the latch fires on drop).
    pub fn run(mut self) -> Result<ScanSummary> {
        let finish = FinishLatch::new(self.queue.clone());
        let result = self.run_phases(finish.clone());
        finish.signal();
        result
    }

    fn run_phases(&mut self, finish: Arc<FinishLatch>) -> Result<ScanSummary> {
        info!(
            targets = self.targets.len(),
            methods = %self.config.methods,
            "liveness scan starting"
        );

        let alive_cap = Arc::new(AtomicBool::new(false));
        let tracker = RestrictionTracker::new(
            &self.config,
            self.queue.clone(),
            finish.clone(),
            alive_cap.clone(),
        );

        let (report, not_probed) = if self.config.methods.has(AliveTestMethods::CONSIDER_ALIVE) {
            (self.consider_alive(tracker), 0)
        } else {
            self.probe_scan(tracker, alive_cap)?
        };

        // DONE
        let dead = dead_count(&self.targets, &report);
        if report.alive_cap_reached && not_probed > 0 {
            let text = format!(
                "Maximum number of alive hosts identified; {} target hosts were not probed.",
                not_probed
            );
            warn!("{}", text);
            if let Err(e) = self.queue.push_status(&error_message(&text)) {
                warn!("failed to publish advisory: {}", e);
            }
        }
        if let Err(e) = self.queue.push_status(&dead_host_message(dead as u64)) {
            warn!("failed to publish dead-host count: {}", e);
        }
        finish.signal();

        let summary = ScanSummary {
            targets: self.targets.len(),
            alive: report.alive_count,
            published: report.alive_count - report.suppressed.len() as u64,
            suppressed: report.suppressed.len(),
            dead,
        };
        info!(
            alive = summary.alive,
            dead = summary.dead,
            published = summary.published,
            "liveness scan finished"
        );
        Ok(summary)
    }

    /// Consider-alive bypass: every target is marked alive, nothing is sent
    fn consider_alive(&self, mut tracker: RestrictionTracker) -> ScanReport {
        debug!("consider-alive selected, skipping probes and sniffer");
        for target in self.targets.iter() {
            if tracker.record_reply(target.canonical()) {
                tracker.observe(target.canonical());
            }
        }
        tracker.into_report()
    }

    /// The probing phases: open resources, arm the sniffer, emit, drain,
    /// tear down in order
    fn probe_scan(
        &mut self,
        tracker: RestrictionTracker,
        alive_cap: Arc<AtomicBool>,
    ) -> Result<(ScanReport, usize)> {
        // INIT
        check_privileges()?;
        let interface = self.config.interface.clone();
        let mut sockets = ProbeSockets::open(self.config.methods, interface.as_deref())?;
        let mut capture = match self.capture_override.take() {
            Some(capture) => capture,
            None => create_capture()?,
        };
        capture.open(interface.as_deref())?;

        // SNIFFER_STARTING: the spawn call returns only after the sniffer
        // signalled readiness from inside its thread
        let handle = sniffer::spawn(
            capture,
            self.targets.clone(),
            tracker,
            self.config.tcp_probe_port,
        )?;
        thread::sleep(self.config.timing.settle());

        // PROBING (stops early when the alive cap latches)
        let probe_result = self.run_probing(&mut sockets, alive_cap);

        // DRAINING: collect late replies; skipped when probing failed hard
        if probe_result.is_ok() {
            debug!("draining late replies");
            thread::sleep(self.config.timing.drain());
        }

        // STOPPING: break -> report hand-back -> join -> close sockets
        let report = handle.wait(self.config.timing.stop_grace());
        drop(sockets);

        let probed = probe_result?;
        Ok((report, self.targets.len().saturating_sub(probed)))
    }

    fn run_probing(
        &self,
        sockets: &mut ProbeSockets,
        alive_cap: Arc<AtomicBool>,
    ) -> Result<usize> {
        let methods = self.config.methods;
        let mut emitter = ProbeEmitter::new(
            sockets,
            self.config.tcp_ports(),
            self.config.tcp_probe_port,
            alive_cap,
        );

        if methods.has(AliveTestMethods::TCP_ACK) {
            emitter.tcp_pass(&self.targets, TcpProbeKind::Ack)?;
        }
        if methods.has(AliveTestMethods::TCP_SYN) {
            emitter.tcp_pass(&self.targets, TcpProbeKind::Syn)?;
        }
        if methods.has(AliveTestMethods::ICMP) {
            emitter.icmp_pass(&self.targets)?;
        }
        if methods.has(AliveTestMethods::ARP) {
            emitter.arp_pass(&self.targets)?;
        }

        Ok(emitter.probed_count())
    }
}

/// Dead targets: everything outside (alive \ suppressed)
fn dead_count(targets: &TargetSet, report: &ScanReport) -> usize {
    targets
        .iter()
        .filter(|target| {
            let canonical = target.canonical();
            !report.alive.contains(canonical) || report.suppressed.contains(canonical)
        })
        .count()
}
