//! Bridge Control Loop
//!
//! One cooperative loop drives the whole process: each iteration checks
//! the shutdown flag, runs a scan when one is due and the broker session
//! is up, then services the session's event loop with a bounded wait so
//! network I/O and reconnects make progress even between scans. Scans are
//! scheduled at a fixed rate; an overrunning scan makes the next one due
//! immediately instead of stacking missed cycles.
//!
//! Shutdown is cooperative: the first signal sets a flag observed between
//! iterations, so an in-progress scan always runs to completion. A second
//! signal forces an immediate exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{MqttConfig, ScanConfig};
use crate::namespace::Namespace;
use crate::publish::MessageSink;
use crate::scan::Scanner;
use crate::session::{Session, SessionError, SessionState};

/// Cooperative shutdown flag shared with the signal listener.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    triggered: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    /// Install the signal listener: SIGINT, SIGTERM and SIGHUP all request
    /// a clean shutdown; a second signal while shutting down exits at once.
    pub fn install() -> std::io::Result<Self> {
        let flag = Self::new();
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;

        let listener = flag.clone();
        tokio::spawn(async move {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = hangup.recv() => "SIGHUP",
            };
            warn!("Received {}, shutting down", name);
            listener.trigger();

            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = hangup.recv() => "SIGHUP",
            };
            warn!("Received {} during shutdown, exiting immediately", name);
            std::process::exit(1);
        });

        Ok(flag)
    }
}

/// The bridge: session, scanner and the schedule tying them together.
pub struct Bridge<N, S> {
    session: Session,
    scanner: Scanner<N, S>,
    root: String,
    interval: Duration,
    service_bound: Duration,
    connect_timeout: Duration,
    faults: u32,
}

impl<N: Namespace, S: MessageSink> Bridge<N, S> {
    pub fn new(
        session: Session,
        scanner: Scanner<N, S>,
        scan_cfg: &ScanConfig,
        mqtt_cfg: &MqttConfig,
    ) -> Self {
        Self {
            session,
            scanner,
            root: scan_cfg.root.clone(),
            interval: scan_cfg.interval_duration(),
            service_bound: mqtt_cfg.service_timeout_duration(),
            connect_timeout: mqtt_cfg.connect_timeout_duration(),
            faults: 0,
        }
    }

    /// Run until shutdown. Returns the number of faults observed, which
    /// becomes the process exit code. The initial connect failing is the
    /// one unrecoverable error.
    pub async fn run(&mut self, shutdown: &ShutdownFlag) -> Result<u32, SessionError> {
        self.session.wait_connected(self.connect_timeout).await?;

        let mut next_scan = Instant::now();
        while !shutdown.is_triggered() {
            if self.session.state() == SessionState::Connected && Instant::now() >= next_scan {
                match self.scanner.scan(&self.root).await {
                    Ok(stats) => debug!(
                        "Scan complete: {} nodes, {} published, {} ignored, {} failed",
                        stats.visited, stats.published, stats.ignored, stats.failed
                    ),
                    Err(e) => {
                        error!("{}; dropping broker session", e);
                        self.session.teardown();
                        self.faults += 1;
                    }
                }
                next_scan = next_deadline(next_scan, self.interval, Instant::now());
            }

            self.session.service_events(self.service_bound).await;
        }

        info!("Shutting down");
        self.session.disconnect().await;
        Ok(self.faults)
    }
}

/// Advance a fixed-rate schedule. When the previous cycle overran, the
/// next one is due immediately; missed cycles never accumulate.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next <= now {
        now
    } else {
        next
    }
}
