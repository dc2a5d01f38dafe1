//! WebSocket subscriber transport.
//!
//! Every accepted connection is registered as a [`WsSubscriber`] backed by a
//! bounded queue. Queueing never waits: a subscriber whose queue is full has
//! stopped keeping up and its connection is closed. A writer task drains the
//! queue into the socket, each write bounded by the send timeout, while the
//! connection task watches the read half for a close. Either side failing
//! ends the connection and unregisters the subscriber.
//!
//! Connection tasks run on a [`TaskTracker`] so shutdown can wait for their
//! Close frames to go out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
    routing::get,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::bridge::{Bridge, StatsSnapshot};
use crate::subscriber::{SendError, Subscriber, SubscriberId};

#[derive(Debug, Clone, Copy)]
pub struct SubscriberSettings {
    /// Upper bound on writing one frame to a subscriber's socket.
    pub send_timeout: Duration,
    /// Frames buffered per subscriber.
    pub queue_capacity: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
    pub cancel: CancellationToken,
    pub settings: SubscriberSettings,
    /// Connection tasks, awaited on shutdown.
    pub connections: TaskTracker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        // any other path upgrades too
        .fallback(ws_handler)
        .with_state(state)
}

/// Stop accepting connection tasks and wait up to `grace` for the running
/// ones to finish. Returns whether they all did.
pub async fn drain_connections(connections: &TaskTracker, grace: Duration) -> bool {
    connections.close();

    match timeout(grace, connections.wait()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(
                remaining = connections.len(),
                "Connections still open after shutdown grace period"
            );
            false
        }
    }
}

/// A connected WebSocket client.
pub struct WsSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Utf8Bytes>,
    connection: CancellationToken,
}

impl WsSubscriber {
    /// `connection` is cancelled when the subscriber falls behind.
    pub fn new(
        id: SubscriberId,
        tx: mpsc::Sender<Utf8Bytes>,
        connection: CancellationToken,
    ) -> Self {
        Self { id, tx, connection }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    async fn send(&self, frame: Utf8Bytes) -> Result<(), SendError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.connection.cancel();
                Err(SendError::Lagging)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| {
        let connections = state.connections.clone();
        connections.track_future(serve_subscriber(socket, SubscriberId::new(), state))
    })
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.bridge.stats())
}

#[instrument(name = "subscriber", skip(socket, state))]
async fn serve_subscriber(socket: WebSocket, id: SubscriberId, state: AppState) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.settings.queue_capacity.max(1));
    let connection = state.cancel.child_token();

    let registry = state.bridge.registry().clone();
    registry.register(Arc::new(WsSubscriber::new(id, tx, connection.clone())));
    info!(subscribers = registry.len(), "Subscriber connected");

    let writer = state.connections.spawn(write_frames(
        sink,
        rx,
        connection.clone(),
        state.settings.send_timeout,
    ));

    read_until_closed(stream, &connection).await;

    registry.unregister(id);
    connection.cancel();
    let _ = writer.await;

    info!(subscribers = registry.len(), "Subscriber disconnected");
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Utf8Bytes>,
    connection: CancellationToken,
    send_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = connection.cancelled() => {
                let close = CloseFrame {
                    code: close_code::AWAY,
                    reason: Utf8Bytes::from_static("connection closed"),
                };
                let _ = timeout(send_timeout, sink.send(Message::Close(Some(close)))).await;
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };

                match timeout(send_timeout, sink.send(Message::Text(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "Write failed");
                        connection.cancel();
                        break;
                    }
                    Err(_) => {
                        debug!("Write timed out, dropping subscriber");
                        connection.cancel();
                        break;
                    }
                }
            }
        }
    }
}

async fn read_until_closed(mut stream: SplitStream<WebSocket>, connection: &CancellationToken) {
    loop {
        tokio::select! {
            _ = connection.cancelled() => break,
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    // client messages carry nothing for the bridge
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Read failed");
                        break;
                    }
                }
            }
        }
    }
}
