use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use repx_bridge::transport::{self, AppState, SubscriberSettings, drain_connections};
use repx_bridge::{Bridge, Ingress, IngressEvent, SubscriberRegistry, UdpIngress};
use repx_core::{Attitude, RawSample, Reading, SeqTracker};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct Server {
    addr: SocketAddr,
    bridge: Bridge,
    cancel: CancellationToken,
    connections: TaskTracker,
}

async fn start_server() -> Server {
    let bridge = Bridge::new(SubscriberRegistry::new());
    let cancel = CancellationToken::new();
    let connections = TaskTracker::new();
    let state = AppState {
        bridge: bridge.clone(),
        cancel: cancel.clone(),
        settings: SubscriberSettings {
            send_timeout: Duration::from_millis(250),
            queue_capacity: 16,
        },
        connections: connections.clone(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, transport::router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    Server {
        addr,
        bridge,
        cancel,
        connections,
    }
}

async fn wait_for_subscribers(bridge: &Bridge, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bridge.registry().len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

fn packet(seq: u16) -> IngressEvent {
    let sample = RawSample {
        sensor0: Attitude {
            roll: 150,
            pitch: -1200,
            yaw: 9000,
        },
        sensor1: Attitude {
            roll: 200,
            pitch: 3300,
            yaw: 9050,
        },
        seq,
    };

    IngressEvent::Notification {
        handle: 0x000e,
        data: sample.to_bytes().into(),
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn websocket_client_receives_decoded_readings() {
    let server = start_server().await;
    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    let mut tracker = SeqTracker::new();
    server.bridge.handle_event(packet(41), &mut tracker).await;
    server.bridge.handle_event(packet(42), &mut tracker).await;

    for expected_seq in [41, 42] {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = message else {
            panic!("expected a text frame");
        };

        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["seq"], expected_seq);
        assert_eq!(json["dP"], 45.0);
        assert_eq!(json["dR"], 0.5);
        assert_eq!(json["y0"], 90.0);

        let reading: Reading = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(reading.p0, -12.0);
    }

    server.cancel.cancel();
}

#[tokio::test]
async fn every_client_gets_the_same_frame() {
    let server = start_server().await;
    let url = format!("ws://{}/", server.addr);
    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    wait_for_subscribers(&server.bridge, 2).await;

    let report = server
        .bridge
        .handle_event(packet(7), &mut SeqTracker::new())
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);

    let a = first.next().await.unwrap().unwrap();
    let b = second.next().await.unwrap().unwrap();
    assert_eq!(a, b);

    server.cancel.cancel();
}

#[tokio::test]
async fn closing_client_is_unregistered() {
    let server = start_server().await;
    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    client.close(None).await.unwrap();
    wait_for_subscribers(&server.bridge, 0).await;

    // broadcasting with nobody connected is a no-op
    let report = server
        .bridge
        .handle_event(packet(1), &mut SeqTracker::new())
        .await
        .unwrap();
    assert_eq!(report.attempted(), 0);

    server.cancel.cancel();
}

#[tokio::test]
async fn dropped_connection_is_unregistered() {
    let server = start_server().await;
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    drop(client);
    wait_for_subscribers(&server.bridge, 0).await;

    server.cancel.cancel();
}

#[tokio::test]
async fn shutdown_sends_close_frame() {
    let server = start_server().await;
    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    server.cancel.cancel();

    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Close(Some(frame)) = message else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::Away);
}

#[tokio::test]
async fn shutdown_waits_for_connections_to_close() {
    let server = start_server().await;
    let url = format!("ws://{}/", server.addr);
    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    wait_for_subscribers(&server.bridge, 2).await;
    assert!(!server.connections.is_empty());

    server.cancel.cancel();
    assert!(drain_connections(&server.connections, Duration::from_secs(5)).await);
    assert!(server.connections.is_empty());
    assert!(server.bridge.registry().is_empty());

    // the Close frames were written before the tasks finished
    for client in [&mut first, &mut second] {
        let message = client.next().await.unwrap().unwrap();
        assert!(matches!(message, Message::Close(Some(_))));
    }
}

#[tokio::test]
async fn shutdown_is_bounded_when_a_client_stops_reading() {
    let server = start_server().await;
    let (_silent, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    // fill the socket buffers and the queue; the client never reads
    let mut tracker = SeqTracker::new();
    for seq in 0..2_000 {
        server.bridge.handle_event(packet(seq), &mut tracker).await;
    }

    server.cancel.cancel();
    assert!(drain_connections(&server.connections, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn any_path_upgrades_to_the_stream() {
    let server = start_server().await;
    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/stream", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.bridge, 1).await;

    server
        .bridge
        .handle_event(packet(5), &mut SeqTracker::new())
        .await;

    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(message, Message::Text(_)));

    server.cancel.cancel();
}

#[tokio::test]
async fn health_and_stats_endpoints() {
    let server = start_server().await;

    let health = http_get(server.addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.ends_with("OK"));

    server
        .bridge
        .handle_event(packet(1), &mut SeqTracker::new())
        .await;

    let stats = http_get(server.addr, "/stats").await;
    assert!(stats.starts_with("HTTP/1.1 200"));
    let body = stats.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["notifications"], 1);
    assert_eq!(json["readings"], 1);
    assert_eq!(json["subscribers"], 0);

    server.cancel.cancel();
}

#[tokio::test]
async fn udp_ingress_forwards_datagrams() {
    let addr = {
        let spare = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap()
    };

    let cancel = CancellationToken::new();
    let mut events = UdpIngress::new(addr).start(cancel.clone()).await.unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sender_port = sender.local_addr().unwrap().port();
    let payload = RawSample {
        seq: 300,
        ..RawSample::default()
    }
    .to_bytes();
    sender.send_to(&payload, addr).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let IngressEvent::Notification { handle, data } = event else {
        panic!("expected a notification");
    };
    assert_eq!(handle, sender_port);
    assert_eq!(&data[..], &payload[..]);

    cancel.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn udp_ingress_reports_bind_failure() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let result = UdpIngress::new(addr).start(CancellationToken::new()).await;

    assert!(result.is_err());
}
