mod api;
mod websocket;

pub use websocket::WebSocketClient;

use netsim_protocol::{
    CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, RoomSnapshot, ServerMessage,
};
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct NetworkClient {
    server_url: String,
    http: reqwest::Client,
}

impl NetworkClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    // Rooms

    pub async fn create_room(&self) -> Result<String> {
        let response: CreateRoomResponse =
            api::post_empty(&self.http, &format!("{}/create-room", self.server_url)).await?;
        Ok(response.room_id)
    }

    /// Reserve a seat in an existing room
    pub async fn join_room(&self, room_id: &str, display_name: &str) -> Result<RoomSnapshot> {
        let request = JoinRoomRequest {
            room_id: room_id.to_string(),
            display_name: display_name.to_string(),
        };
        let response: JoinRoomResponse =
            api::post(&self.http, &format!("{}/join-room", self.server_url), &request).await?;

        match response.room {
            Some(room) if response.success => Ok(room),
            _ => Err(ClientError::Rejected {
                status: 200,
                code: "join_failed".to_string(),
                message: response
                    .error
                    .unwrap_or_else(|| "Join was not accepted".to_string()),
            }),
        }
    }

    pub async fn room_info(&self, room_id: &str) -> Result<RoomSnapshot> {
        api::get(&self.http, &format!("{}/api/rooms/{}", self.server_url, room_id)).await
    }

    // WebSocket

    pub async fn connect(&self) -> Result<(WebSocketClient, mpsc::Receiver<ServerMessage>)> {
        WebSocketClient::connect(&self.ws_url()).await
    }

    pub fn ws_url(&self) -> String {
        // Convert http to ws
        let base = self
            .server_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        format!("{}/ws", base)
    }
}
