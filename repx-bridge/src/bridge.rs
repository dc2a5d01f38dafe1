use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use repx_core::{Reading, SeqObservation, SeqTracker, decode};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::IngressPolicy;
use crate::fanout::{BroadcastReport, Broadcaster};
use crate::ingress::{Ingress, IngressEvent};
use crate::registry::SubscriberRegistry;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("ingress unavailable: {0}")]
    IngressUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("ingress stopped producing")]
    IngressEnded,
}

/// Why a pump loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Cancelled,
    IngressClosed,
}

/// Running counters for the bridge.
#[derive(Debug, Default)]
pub struct BridgeStats {
    notifications: AtomicU64,
    short_packets: AtomicU64,
    readings: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    seq_gaps: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Raw notifications received.
    pub notifications: u64,
    /// Notifications too short to hold a sample.
    pub short_packets: u64,
    /// Readings broadcast, decoded or synthetic.
    pub readings: u64,
    /// Successful per-subscriber deliveries.
    pub deliveries: u64,
    /// Failed per-subscriber deliveries.
    pub delivery_failures: u64,
    /// Packets missing according to the sequence counter.
    pub seq_gaps: u64,
    /// Subscribers currently connected.
    pub subscribers: usize,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// Ingress → codec → fan-out.
#[derive(Clone)]
pub struct Bridge {
    broadcaster: Broadcaster,
    stats: Arc<BridgeStats>,
}

impl Bridge {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
            stats: Arc::new(BridgeStats::default()),
        }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        self.broadcaster.registry()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        StatsSnapshot {
            notifications: load(&self.stats.notifications),
            short_packets: load(&self.stats.short_packets),
            readings: load(&self.stats.readings),
            deliveries: load(&self.stats.deliveries),
            delivery_failures: load(&self.stats.delivery_failures),
            seq_gaps: load(&self.stats.seq_gaps),
            subscribers: self.registry().len(),
        }
    }

    /// Decode (if needed) and broadcast one ingress event.
    ///
    /// Returns `None` when the event carried no reading.
    pub async fn handle_event(
        &self,
        event: IngressEvent,
        tracker: &mut SeqTracker,
    ) -> Option<BroadcastReport> {
        let reading = match event {
            IngressEvent::Notification { handle, data } => {
                bump(&self.stats.notifications, 1);

                let Some(reading) = decode(&data) else {
                    bump(&self.stats.short_packets, 1);
                    trace!(handle, len = data.len(), "Dropped short notification");
                    return None;
                };
                reading
            }
            IngressEvent::Sample(reading) => reading,
        };

        self.observe_sequence(&reading, tracker);
        bump(&self.stats.readings, 1);

        let report = self.broadcaster.broadcast(&reading).await;
        bump(&self.stats.deliveries, report.delivered as u64);
        bump(&self.stats.delivery_failures, report.failed as u64);

        Some(report)
    }

    fn observe_sequence(&self, reading: &Reading, tracker: &mut SeqTracker) {
        match tracker.observe(reading.seq) {
            SeqObservation::Gap { missing } => {
                bump(&self.stats.seq_gaps, u64::from(missing));
                debug!(seq = reading.seq, missing, "Sequence gap");
            }
            SeqObservation::Duplicate => debug!(seq = reading.seq, "Duplicate sequence number"),
            SeqObservation::Reordered => debug!(seq = reading.seq, "Out-of-order packet"),
            SeqObservation::First | SeqObservation::InOrder => {}
        }

        trace!(
            seq = reading.seq,
            dp = reading.dp,
            dr = reading.dr,
            dy = reading.dy,
            "Reading"
        );
    }

    /// Forward events from one ingress session until it closes or `cancel`
    /// fires.
    #[instrument(name = "bridge_pump", skip_all)]
    pub async fn pump(
        &self,
        mut events: mpsc::Receiver<IngressEvent>,
        cancel: &CancellationToken,
    ) -> PumpOutcome {
        let mut tracker = SeqTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Bridge pump shutting down");
                    return PumpOutcome::Cancelled;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return PumpOutcome::IngressClosed;
                    };
                    self.handle_event(event, &mut tracker).await;
                }
            }
        }
    }

    /// Run ingress sessions under `policy` until cancelled.
    ///
    /// With [`IngressPolicy::Exit`] the first failure to start, or the first
    /// session that ends on its own, is returned as an error.
    pub async fn run_ingress<I: Ingress>(
        &self,
        ingress: &I,
        policy: IngressPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), BridgeError> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let session = cancel.child_token();

            let failure = match ingress.start(session.clone()).await {
                Ok(events) => {
                    info!("Ingress session started");
                    backoff = INITIAL_BACKOFF;

                    let outcome = self.pump(events, cancel).await;
                    session.cancel();

                    match outcome {
                        PumpOutcome::Cancelled => return Ok(()),
                        PumpOutcome::IngressClosed => {
                            warn!("Ingress stopped producing");
                            BridgeError::IngressEnded
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to start ingress");
                    BridgeError::IngressUnavailable(Box::new(e))
                }
            };

            match policy {
                IngressPolicy::Exit => return Err(failure),
                IngressPolicy::KeepServing => {
                    warn!("No longer producing readings, still serving subscribers");
                    cancel.cancelled().await;
                    return Ok(());
                }
                IngressPolicy::Restart => {
                    warn!(backoff_secs = backoff.as_secs(), "Restarting ingress after backoff");

                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }

                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
