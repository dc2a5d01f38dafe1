pub mod mock;
pub mod udp;

use async_trait::async_trait;
use repx_core::Reading;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the channel between an ingress and the bridge.
pub const INGRESS_CHANNEL_CAPACITY: usize = 100;

/// Data produced by an ingress.
#[derive(Debug, Clone)]
pub enum IngressEvent {
    /// A raw notification payload, still to be decoded.
    Notification { handle: u16, data: Box<[u8]> },
    /// An already-decoded sample.
    Sample(Reading),
}

/// Trait for sources of motion samples.
///
/// Implementations spawn background tasks that send events to an mpsc
/// channel. The receiver is returned from `start`. The tasks run until the
/// cancellation token is cancelled or the source fails; in both cases the
/// channel is closed.
#[async_trait]
pub trait Ingress: Send + Sync + 'static {
    /// Error type for this ingress implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start producing events.
    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngressEvent>, Self::Error>;
}
