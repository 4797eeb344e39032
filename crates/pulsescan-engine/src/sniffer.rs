//! Reply sniffer thread
//!
//! The sniffer owns the capture handle and the restriction tracker for the
//! duration of the scan. Spawning blocks until the thread has signalled
//! readiness, so no probe can leave before the capture loop is armed and
//! the earliest replies can be seen. Shutdown is cooperative: a stop flag
//! read between polls (each bounded by the capture timeout), then the
//! tracker state is closed over a channel. If the thread fails to hand
//! back within the grace period it is detached and the scan proceeds with
//! an empty report.

use crate::classifier::classify_frame;
use crate::restrictions::{RestrictionTracker, ScanReport};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use pulsescan_core::{canonical_ip, Result, TargetSet};
use pulsescan_net::{ReplyCapture, POLL_TIMEOUT_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Running sniffer thread
pub struct SnifferHandle {
    join: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    report_rx: Receiver<ScanReport>,
}

/// Spawn the sniffer and wait for it to arm its capture loop
///
/// The returned handle is the only way to stop the thread and recover the
/// alive/suppressed bookkeeping.
pub fn spawn(
    mut capture: Box<dyn ReplyCapture>,
    targets: Arc<TargetSet>,
    mut tracker: RestrictionTracker,
    tcp_probe_port: u16,
) -> Result<SnifferHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let (report_tx, report_rx) = bounded(1);
    let ready = Arc::new((Mutex::new(false), Condvar::new()));

    let thread_stop = stop.clone();
    let thread_ready = ready.clone();
    let join = thread::Builder::new()
        .name("pulsescan-sniffer".to_string())
        .spawn(move || {
            {
                let (lock, cvar) = &*thread_ready;
                *lock.lock() = true;
                cvar.notify_one();
            }
            debug!("sniffer entering capture loop");

            while !thread_stop.load(Ordering::Relaxed) {
                match capture.next_frame(POLL_TIMEOUT_MS) {
                    Ok(Some(frame)) => {
                        if let Some(addr) = classify_frame(&frame, tcp_probe_port) {
                            let canonical = canonical_ip(addr).to_string();
                            if tracker.record_reply(&canonical) && targets.contains(&canonical) {
                                debug!(host = %canonical, "target reported alive");
                                tracker.observe(&canonical);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("capture read error: {}", e);
                        thread::sleep(Duration::from_millis(POLL_TIMEOUT_MS));
                    }
                }
            }

            if let Err(e) = capture.close() {
                warn!("capture close failed: {}", e);
            }
            let _ = report_tx.send(tracker.into_report());
            debug!("sniffer exiting");
        })?;

    // startup barrier: no probe before the filter is armed
    {
        let (lock, cvar) = &*ready;
        let mut armed = lock.lock();
        while !*armed {
            cvar.wait(&mut armed);
        }
    }

    Ok(SnifferHandle {
        join: Some(join),
        stop,
        report_rx,
    })
}

impl SnifferHandle {
    /// Ask the capture loop to stop at its next poll
    pub fn request_break(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Collect the sniffer's report, cancelling after the grace period
    ///
    /// The cooperative break is bounded by one capture poll; a thread that
    /// still has not handed back after `grace` is detached so teardown can
    /// continue.
    pub fn wait(mut self, grace: Duration) -> ScanReport {
        self.request_break();

        match self.report_rx.recv_timeout(grace) {
            Ok(report) => {
                if let Some(join) = self.join.take() {
                    if join.join().is_err() {
                        warn!("sniffer thread panicked after reporting");
                    }
                }
                report
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("sniffer did not stop within grace period, detaching");
                self.join.take();
                ScanReport::empty()
            }
            Err(RecvTimeoutError::Disconnected) => {
                // thread died without reporting (panic before send)
                warn!("sniffer exited without a report");
                if let Some(join) = self.join.take() {
                    let _ = join.join();
                }
                ScanReport::empty()
            }
        }
    }
}
