//! Fan-out of one payload to every registered subscriber.
//!
//! ```text
//!   broadcast(&reading)
//!         │  snapshot registry (empty => return)
//!         │  serialize once -> Utf8Bytes (shared, refcounted)
//!         ▼
//!   ┌─────────┬─────────┬─────────┐
//!   │ send(a) │ send(b) │ send(c) │   one task each
//!   └────┬────┴────┬────┴────┬────┘
//!        └─────────┴─────────┘
//!           settle all -> BroadcastReport
//! ```
//!
//! A failed send is counted and otherwise ignored. Removing dead subscribers
//! is left to the transport, which notices the close on its own.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::registry::SubscriberRegistry;
use crate::subscriber::Subscriber;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: SubscriberRegistry,
}

impl Broadcaster {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Serialize `payload` to JSON once and deliver it to every subscriber
    /// present right now.
    ///
    /// Never fails. Returns once every delivery attempt has settled.
    pub async fn broadcast<T>(&self, payload: &T) -> BroadcastReport
    where
        T: Serialize + ?Sized,
    {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return BroadcastReport::default();
        }

        let frame = match serde_json::to_string(payload) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast payload");
                return BroadcastReport {
                    delivered: 0,
                    failed: subscribers.len(),
                };
            }
        };

        deliver_all(subscribers, frame).await
    }
}

async fn deliver_all(subscribers: Vec<Arc<dyn Subscriber>>, frame: Utf8Bytes) -> BroadcastReport {
    let mut deliveries = JoinSet::new();

    for subscriber in subscribers {
        let frame = frame.clone();
        deliveries.spawn(async move {
            let id = subscriber.id();
            (id, subscriber.send(frame).await)
        });
    }

    let mut report = BroadcastReport::default();

    while let Some(joined) = deliveries.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.delivered += 1,
            Ok((id, Err(e))) => {
                debug!(subscriber = %id, error = %e, "Delivery failed");
                report.failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "Delivery task did not complete");
                report.failed += 1;
            }
        }
    }

    report
}
