use std::fmt;

use async_trait::async_trait;
use axum::extract::ws::Utf8Bytes;
use ulid::Ulid;

/// Identity of one subscriber connection. Not stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub Ulid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("subscriber is not keeping up")]
    Lagging,
}

/// A stream subscriber as seen by the fan-out.
///
/// Implementations must not wait on the peer in `send`: the fan-out waits
/// for every attempt to settle before the next reading goes out.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    fn id(&self) -> SubscriberId;

    /// Deliver one serialized message.
    async fn send(&self, frame: Utf8Bytes) -> Result<(), SendError>;
}
