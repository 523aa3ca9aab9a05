//! Integration tests for the NetSim relay server
//!
//! Each test starts the real router on an ephemeral port and talks to it over
//! HTTP and WebSocket.
//!
//! Run with: cargo test -p netsim-server --test integration_tests

use futures_util::{SinkExt, StreamExt};
use netsim_protocol::{
    limits, ClientMessage, CreateRoomResponse, LayerPhase, LayerProgress, Payload, ServerMessage,
    TransmissionData, TransportProtocol,
};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Message},
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Test helper to start a test server
async fn start_test_server() -> TestServer {
    TestServer::start().await.expect("Failed to start test server")
}

/// Test server wrapper
struct TestServer {
    addr: std::net::SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> anyhow::Result<Self> {
        Self::start_with(netsim_server::state::Config::default()).await
    }

    async fn start_with(config: netsim_server::state::Config) -> anyhow::Result<Self> {
        let config = netsim_server::state::Config {
            bind_address: "127.0.0.1:0".to_string(),
            ..config
        };

        let (router, _state) = netsim_server::create_app(config);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn create_room(client: &Client, http_url: &str) -> anyhow::Result<String> {
    let response: CreateRoomResponse = client
        .post(format!("{}/create-room", http_url))
        .send()
        .await?
        .json()
        .await?;
    anyhow::ensure!(response.success, "create-room reported failure");
    Ok(response.room_id)
}

async fn join_room_http(
    client: &Client,
    http_url: &str,
    room_id: &str,
    name: &str,
) -> anyhow::Result<(StatusCode, serde_json::Value)> {
    let response = client
        .post(format!("{}/join-room", http_url))
        .json(&json!({ "roomId": room_id, "displayName": name }))
        .send()
        .await?;
    let status = response.status();
    Ok((status, response.json().await?))
}

async fn connect(ws_url: &str) -> anyhow::Result<WsStream> {
    let (ws_stream, _) = connect_async(ws_url).await?;
    Ok(ws_stream)
}

async fn send(ws: &mut WsStream, message: &ClientMessage) -> anyhow::Result<()> {
    ws.send(Message::Text(serde_json::to_string(message)?.into()))
        .await?;
    Ok(())
}

/// Read until an event with the given name arrives, skipping anything else
async fn expect_event(ws: &mut WsStream, event: &str) -> anyhow::Result<ServerMessage> {
    let (_, msg) = events_until(ws, event, Duration::from_secs(5)).await?;
    Ok(msg)
}

/// Read until an event with the given name arrives, returning the names of
/// everything skipped on the way
async fn events_until(
    ws: &mut WsStream,
    event: &str,
    wait: Duration,
) -> anyhow::Result<(Vec<String>, ServerMessage)> {
    let mut skipped = Vec::new();
    loop {
        let frame = timeout(wait, ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("Timed out waiting for {}", event))?
            .ok_or_else(|| anyhow::anyhow!("Stream ended waiting for {}", event))??;

        if let Message::Text(text) = frame {
            let msg: ServerMessage = serde_json::from_str(&text)?;
            if msg.event_name() == event {
                return Ok((skipped, msg));
            }
            skipped.push(msg.event_name().to_string());
        }
    }
}

async fn announce(ws: &mut WsStream, room_id: &str, name: &str) -> anyhow::Result<()> {
    send(
        ws,
        &ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
            display_name: name.to_string(),
        },
    )
    .await?;
    expect_event(ws, "room-update").await?;
    Ok(())
}

fn start_transmission(text: &str, target: &str) -> ClientMessage {
    ClientMessage::StartTransmission {
        transmission_data: TransmissionData {
            id: Some(1_718_000_000_000),
            protocol: TransportProtocol::Tcp,
            payload: Payload::Text {
                text: text.to_string(),
            },
            created_at: None,
            transmission_id: None,
            extra: Default::default(),
        },
        target_computer: target.to_string(),
    }
}

/// A media transmission whose base64 data is `encoded_len` characters long
fn media_transmission(encoded_len: usize, target: &str) -> ClientMessage {
    ClientMessage::StartTransmission {
        transmission_data: TransmissionData {
            id: Some(1_718_000_000_000),
            protocol: TransportProtocol::Udp,
            payload: Payload::Media {
                name: "capture.bin".to_string(),
                media_type: "application/octet-stream".to_string(),
                size: (encoded_len / 4 * 3) as u64,
                data: "A".repeat(encoded_len),
            },
            created_at: None,
            transmission_id: None,
            extra: Default::default(),
        },
        target_computer: target.to_string(),
    }
}

/// Two announced computers in a fresh room
async fn paired(server: &TestServer) -> (WsStream, WsStream) {
    let client = Client::new();
    let room_id = create_room(&client, &server.http_url()).await.unwrap();

    let mut pc1 = connect(&server.ws_url()).await.unwrap();
    announce(&mut pc1, &room_id, "PC-1").await.unwrap();
    let mut pc2 = connect(&server.ws_url()).await.unwrap();
    announce(&mut pc2, &room_id, "PC-2").await.unwrap();
    expect_event(&mut pc1, "computer-joined").await.unwrap();

    (pc1, pc2)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_health() {
    let server = start_test_server().await;
    let body = Client::new()
        .get(format!("{}/health", server.http_url()))
        .send()
        .await
        .expect("Health request failed")
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_two_computer_session() {
    let server = start_test_server().await;
    let client = Client::new();

    let room_id = create_room(&client, &server.http_url())
        .await
        .expect("Failed to create room");
    assert_eq!(room_id.len(), 6);

    // PC-1 goes straight to the WebSocket, as the room creator does
    let mut pc1 = connect(&server.ws_url()).await.expect("PC-1 failed to connect");
    announce(&mut pc1, &room_id, "PC-1").await.unwrap();

    // PC-2 reserves over HTTP first, using a lower-case id
    let (status, body) = join_room_http(&client, &server.http_url(), &room_id.to_lowercase(), "PC-2")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK, "join failed: {}", body);
    assert_eq!(body["success"], true);

    let mut pc2 = connect(&server.ws_url()).await.expect("PC-2 failed to connect");
    announce(&mut pc2, &room_id, "PC-2").await.unwrap();

    match expect_event(&mut pc1, "computer-joined").await.unwrap() {
        ServerMessage::ComputerJoined(notice) => assert_eq!(notice.computer_name, "PC-2"),
        other => panic!("Expected ComputerJoined, got {:?}", other),
    }
    match expect_event(&mut pc1, "room-update").await.unwrap() {
        ServerMessage::RoomUpdate(update) => {
            assert_eq!(update.computers, vec!["PC-1".to_string(), "PC-2".to_string()]);
            assert_eq!(update.room_id, room_id);
        }
        other => panic!("Expected RoomUpdate, got {:?}", other),
    }

    // Third computer is turned away
    let (status, body) = join_room_http(&client, &server.http_url(), &room_id, "PC-3")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    // First transmission gets id 1
    send(&mut pc1, &start_transmission("hello", "PC-2")).await.unwrap();
    match expect_event(&mut pc1, "transmission-sent").await.unwrap() {
        ServerMessage::TransmissionSent {
            success,
            transmission_id,
        } => {
            assert!(success);
            assert_eq!(transmission_id, 1);
        }
        other => panic!("Expected TransmissionSent, got {:?}", other),
    }
    match expect_event(&mut pc2, "receive-transmission").await.unwrap() {
        ServerMessage::ReceiveTransmission {
            sender,
            transmission_id,
            transmission_data,
            ..
        } => {
            assert_eq!(sender, "PC-1");
            assert_eq!(transmission_id, 1);
            assert_eq!(transmission_data.transmission_id, Some(1));
            assert_eq!(
                transmission_data.payload,
                Payload::Text {
                    text: "hello".to_string()
                }
            );
        }
        other => panic!("Expected ReceiveTransmission, got {:?}", other),
    }

    // Reply from the other side gets id 2
    send(&mut pc2, &start_transmission("hi back", "PC-1")).await.unwrap();
    match expect_event(&mut pc2, "transmission-sent").await.unwrap() {
        ServerMessage::TransmissionSent {
            transmission_id, ..
        } => assert_eq!(transmission_id, 2),
        other => panic!("Expected TransmissionSent, got {:?}", other),
    }

    // Layer progress is relayed
    send(
        &mut pc1,
        &ClientMessage::LayerUpdate(LayerProgress {
            layer: 0,
            progress: 100.0 / 7.0,
            computer: "PC-1".to_string(),
            phase: LayerPhase::Encapsulation,
        }),
    )
    .await
    .unwrap();
    match expect_event(&mut pc2, "layer-update-received").await.unwrap() {
        ServerMessage::LayerUpdateReceived {
            layer,
            computer,
            phase,
            ..
        } => {
            assert_eq!(layer, 0);
            assert_eq!(computer, "PC-1");
            assert_eq!(phase, LayerPhase::Encapsulation);
        }
        other => panic!("Expected LayerUpdateReceived, got {:?}", other),
    }

    // PC-1 drops; PC-2 hears about it and sees a one-computer room
    pc1.close(None).await.unwrap();
    match expect_event(&mut pc2, "computer-left").await.unwrap() {
        ServerMessage::ComputerLeft(notice) => assert_eq!(notice.computer_name, "PC-1"),
        other => panic!("Expected ComputerLeft, got {:?}", other),
    }
    match expect_event(&mut pc2, "room-update").await.unwrap() {
        ServerMessage::RoomUpdate(update) => {
            assert_eq!(update.computers, vec!["PC-2".to_string()]);
            assert_eq!(update.room_data.transmission_count, 2);
        }
        other => panic!("Expected RoomUpdate, got {:?}", other),
    }

    // Last one out destroys the room
    pc2.close(None).await.unwrap();
    let mut status = StatusCode::OK;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = client
            .get(format!("{}/api/rooms/{}", server.http_url(), room_id))
            .send()
            .await
            .unwrap()
            .status();
        if status == StatusCode::NOT_FOUND {
            break;
        }
    }
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = join_room_http(&client, &server.http_url(), &room_id, "PC-1")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unbound_connection_cannot_transmit() {
    let server = start_test_server().await;
    let mut ws = connect(&server.ws_url()).await.unwrap();

    send(&mut ws, &start_transmission("lost", "nobody")).await.unwrap();
    match expect_event(&mut ws, "transmission-error").await.unwrap() {
        ServerMessage::TransmissionError { error } => assert!(!error.is_empty()),
        other => panic!("Expected TransmissionError, got {:?}", other),
    }

    send(
        &mut ws,
        &ClientMessage::TransmissionError {
            error: "boom".to_string(),
        },
    )
    .await
    .unwrap();
    match expect_event(&mut ws, "error").await.unwrap() {
        ServerMessage::Error { code, .. } => assert_eq!(code, "not_in_room"),
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let server = start_test_server().await;
    let mut ws = connect(&server.ws_url()).await.unwrap();

    ws.send(Message::Text("{not json".to_string().into())).await.unwrap();
    match expect_event(&mut ws, "error").await.unwrap() {
        ServerMessage::Error { code, .. } => assert_eq!(code, "malformed_event"),
        other => panic!("Expected Error, got {:?}", other),
    }

    send(&mut ws, &ClientMessage::Ping).await.unwrap();
    assert_eq!(expect_event(&mut ws, "pong").await.unwrap(), ServerMessage::Pong);
}

#[tokio::test]
async fn test_join_unknown_room_over_websocket() {
    let server = start_test_server().await;
    let mut ws = connect(&server.ws_url()).await.unwrap();

    send(
        &mut ws,
        &ClientMessage::JoinRoom {
            room_id: "ZZZZZZ".to_string(),
            display_name: "PC-1".to_string(),
        },
    )
    .await
    .unwrap();

    match expect_event(&mut ws, "error").await.unwrap() {
        ServerMessage::Error { code, .. } => assert_eq!(code, "room_not_found"),
        other => panic!("Expected Error, got {:?}", other),
    }
}

/// Relay tuned for 3000-byte media files
fn small_media_config() -> netsim_server::state::Config {
    netsim_server::state::Config {
        max_message_bytes: limits::frame_limit(3000),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_oversized_event_is_refused_without_dropping_the_sender() {
    let server = TestServer::start_with(small_media_config()).await.unwrap();
    let (mut pc1, mut pc2) = paired(&server).await;

    let oversized = limits::frame_limit(3000) + 10_000;
    send(&mut pc1, &media_transmission(oversized, "PC-2")).await.unwrap();
    match expect_event(&mut pc1, "error").await.unwrap() {
        ServerMessage::Error { code, .. } => assert_eq!(code, "payload_too_large"),
        other => panic!("Expected Error, got {:?}", other),
    }

    // PC-1 is still seated and can keep transmitting
    send(&mut pc1, &start_transmission("still here", "PC-2")).await.unwrap();
    let (skipped, msg) = events_until(&mut pc2, "receive-transmission", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(
        !skipped.iter().any(|e| e == "computer-left"),
        "PC-2 saw {:?}",
        skipped
    );
    match msg {
        ServerMessage::ReceiveTransmission { transmission_id, .. } => {
            assert_eq!(transmission_id, 1)
        }
        other => panic!("Expected ReceiveTransmission, got {:?}", other),
    }
}

#[tokio::test]
async fn test_largest_media_fits_a_reduced_frame_limit() {
    let server = TestServer::start_with(small_media_config()).await.unwrap();
    let (mut pc1, mut pc2) = paired(&server).await;

    let encoded_len = limits::base64_len(3000) as usize;
    send(&mut pc1, &media_transmission(encoded_len, "PC-2")).await.unwrap();

    match expect_event(&mut pc2, "receive-transmission").await.unwrap() {
        ServerMessage::ReceiveTransmission {
            transmission_data, ..
        } => match transmission_data.payload {
            Payload::Media { data, size, .. } => {
                assert_eq!(data.len(), encoded_len);
                assert_eq!(size, 3000);
            }
            other => panic!("Expected media, got {:?}", other),
        },
        other => panic!("Expected ReceiveTransmission, got {:?}", other),
    }
}

#[tokio::test]
async fn test_largest_accepted_media_is_relayed_at_default_limits() {
    let server = start_test_server().await;
    let client = Client::new();
    let room_id = create_room(&client, &server.http_url()).await.unwrap();

    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(limits::MAX_MESSAGE_BYTES))
        .max_frame_size(Some(limits::MAX_MESSAGE_BYTES));
    let mut pc1 = connect(&server.ws_url()).await.unwrap();
    announce(&mut pc1, &room_id, "PC-1").await.unwrap();
    let (mut pc2, _) = connect_async_with_config(server.ws_url(), Some(ws_config), false)
        .await
        .unwrap();
    announce(&mut pc2, &room_id, "PC-2").await.unwrap();

    let encoded_len = limits::base64_len(limits::MAX_MEDIA_BYTES) as usize;
    send(&mut pc1, &media_transmission(encoded_len, "PC-2")).await.unwrap();

    let (skipped, msg) = events_until(&mut pc2, "receive-transmission", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(!skipped.iter().any(|e| e == "computer-left"));
    match msg {
        ServerMessage::ReceiveTransmission {
            transmission_data, ..
        } => match transmission_data.payload {
            Payload::Media { data, .. } => assert_eq!(data.len(), encoded_len),
            other => panic!("Expected media, got {:?}", other),
        },
        other => panic!("Expected ReceiveTransmission, got {:?}", other),
    }
}
