//! Quota accounting for alive hosts
//!
//! The tracker is the single authority over the alive and suppressed sets
//! and the two scan quotas. During a probing scan it lives on the sniffer
//! thread and is driven once per newly seen reply; in consider-alive mode
//! the orchestrator drives it directly. Either way there is exactly one
//! caller at a time, so the only cross-thread state is the latching
//! alive-cap flag the emitter polls.

use crate::queue::{FinishLatch, HostQueue};
use pulsescan_core::EngineConfig;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Alive/suppressed bookkeeping plus the publication and emission gates
pub struct RestrictionTracker {
    alive: HashSet<String>,
    suppressed: HashSet<String>,
    alive_count: u64,
    max_scan_hosts: u64,
    max_alive_hosts: u64,
    scan_cap_reached: bool,
    alive_cap: Arc<AtomicBool>,
    queue: Arc<dyn HostQueue>,
    finish: Arc<FinishLatch>,
}

impl RestrictionTracker {
    pub fn new(
        config: &EngineConfig,
        queue: Arc<dyn HostQueue>,
        finish: Arc<FinishLatch>,
        alive_cap: Arc<AtomicBool>,
    ) -> Self {
        Self {
            alive: HashSet::new(),
            suppressed: HashSet::new(),
            alive_count: 0,
            max_scan_hosts: config.max_scan_hosts,
            max_alive_hosts: config.max_alive_hosts,
            scan_cap_reached: false,
            alive_cap,
            queue,
            finish,
        }
    }

    /// Record a reply source in the alive set
    ///
    /// Returns `true` only on first insertion, which is the deduplication
    /// point. Non-targets land here too; only the caller's
    /// target-membership check decides whether `observe` follows.
    pub fn record_reply(&mut self, canonical: &str) -> bool {
        self.alive.insert(canonical.to_string())
    }

    /// Account one newly alive target
    ///
    /// Publishes the host unless the scan cap was already reached (then the
    /// host is suppressed), publishes the finish sentinel the moment the
    /// scan cap fills, and latches the emission gate when the alive cap is
    /// hit.
    pub fn observe(&mut self, canonical: &str) {
        self.alive_count += 1;

        if !self.scan_cap_reached {
            if let Err(e) = self.queue.push_host(canonical) {
                warn!(host = %canonical, "failed to publish host: {}", e);
            }
        } else {
            debug!(host = %canonical, "scan cap reached, suppressing host");
            self.suppressed.insert(canonical.to_string());
        }

        if !self.scan_cap_reached && self.alive_count >= self.max_scan_hosts {
            self.scan_cap_reached = true;
            info!(
                max_scan_hosts = self.max_scan_hosts,
                "scan cap reached, closing the downstream queue"
            );
            self.finish.signal();
        }

        if self.alive_count >= self.max_alive_hosts && !self.alive_cap.load(Ordering::Relaxed) {
            info!(
                max_alive_hosts = self.max_alive_hosts,
                "alive cap reached, probe emission will halt"
            );
            self.alive_cap.store(true, Ordering::Relaxed);
        }
    }

    /// Hand the accumulated sets and flags back for the final report
    pub fn into_report(self) -> ScanReport {
        ScanReport {
            alive_cap_reached: self.alive_cap.load(Ordering::Relaxed),
            alive: self.alive,
            suppressed: self.suppressed,
            alive_count: self.alive_count,
            scan_cap_reached: self.scan_cap_reached,
        }
    }
}

/// What the sniffer hands back when the scan winds down
#[derive(Debug)]
pub struct ScanReport {
    pub alive: HashSet<String>,
    pub suppressed: HashSet<String>,
    pub alive_count: u64,
    pub scan_cap_reached: bool,
    pub alive_cap_reached: bool,
}

impl ScanReport {
    /// Report used when the sniffer could not hand its state back
    pub fn empty() -> Self {
        Self {
            alive: HashSet::new(),
            suppressed: HashSet::new(),
            alive_count: 0,
            scan_cap_reached: false,
            alive_cap_reached: false,
        }
    }
}
