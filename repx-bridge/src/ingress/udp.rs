use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::{net::UdpSocket, sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, trace, warn};

use super::{INGRESS_CHANNEL_CAPACITY, Ingress, IngressEvent};

/// Largest datagram accepted. Notifications are far smaller.
const MAX_DATAGRAM: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum UdpIngressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw notifications forwarded as UDP datagrams, one payload per datagram.
///
/// Whatever relays the peripheral's notifications (a BLE helper, a serial
/// shim, a replay tool) sends each payload unchanged. Datagrams carry no
/// characteristic handle, so the sender's port is reported in its place.
pub struct UdpIngress {
    addr: SocketAddr,
}

impl UdpIngress {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Ingress for UdpIngress {
    type Error = UdpIngressError;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngressEvent>, Self::Error> {
        let (tx, rx) = mpsc::channel(INGRESS_CHANNEL_CAPACITY);

        let socket = UdpSocket::bind(self.addr).await?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "UDP ingress started");

        tokio::spawn(run_receive_loop(socket, local_addr, tx, cancel));

        Ok(rx)
    }
}

#[instrument(name = "udp_ingress", skip(socket, tx, cancel))]
async fn run_receive_loop(
    socket: UdpSocket,
    local_addr: SocketAddr,
    tx: mpsc::Sender<IngressEvent>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing UDP ingress");
                break;
            }
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((n, peer)) => {
                        trace!(%peer, len = n, "Notification received");

                        let event = IngressEvent::Notification {
                            handle: peer.port(),
                            data: buf[..n].into(),
                        };

                        if tx.send(event).await.is_err() {
                            info!("Channel closed, UDP ingress shutting down");
                            break;
                        }
                    }
                    Err(e) => {
                        if is_transient_error(&e) {
                            warn!(error = %e, "Transient receive error");
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            error!(error = %e, "UDP ingress failed");
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionReset | Interrupted | WouldBlock | OutOfMemory
    )
}
