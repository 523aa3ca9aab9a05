use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LayerPhase, LayerProgress, PresenceNotice, RoomUpdate, TransmissionData};

/// Events sent from client to server over the WebSocket
///
/// Each frame is `{"event": "<kebab-case name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Announce this connection as a participant of a room
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        #[serde(alias = "computerName")]
        display_name: String,
    },

    /// Ask for a fresh `room-update` to be pushed to the whole room
    #[serde(rename_all = "camelCase")]
    RequestRoomInfo { room_id: String },

    /// Begin a transmission to the other participant
    #[serde(rename_all = "camelCase")]
    StartTransmission {
        transmission_data: TransmissionData,
        target_computer: String,
    },

    /// Progress through one simulated OSI layer
    LayerUpdate(LayerProgress),

    /// The local transfer finished; `transmission` is passed through untouched
    TransmissionComplete { transmission: serde_json::Value },

    /// The local transfer failed
    TransmissionError { error: String },

    /// Leave the current room without closing the connection
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        #[serde(default)]
        room_id: Option<String>,
    },

    /// Keepalive
    Ping,
}

impl ClientMessage {
    /// Wire name of the event, for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::RequestRoomInfo { .. } => "request-room-info",
            ClientMessage::StartTransmission { .. } => "start-transmission",
            ClientMessage::LayerUpdate(_) => "layer-update",
            ClientMessage::TransmissionComplete { .. } => "transmission-complete",
            ClientMessage::TransmissionError { .. } => "transmission-error",
            ClientMessage::LeaveRoom { .. } => "leave-room",
            ClientMessage::Ping => "ping",
        }
    }
}

/// Events sent from server to client over the WebSocket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Another participant entered the room
    ComputerJoined(PresenceNotice),

    /// Another participant left or disconnected
    ComputerLeft(PresenceNotice),

    /// Full room snapshot
    RoomUpdate(RoomUpdate),

    /// A transmission from the other participant
    #[serde(rename_all = "camelCase")]
    ReceiveTransmission {
        transmission_data: TransmissionData,
        sender: String,
        timestamp: DateTime<Utc>,
        transmission_id: u64,
    },

    /// Relayed layer progress from the other participant
    LayerUpdateReceived {
        layer: i64,
        progress: f64,
        computer: String,
        #[serde(rename = "type")]
        phase: LayerPhase,
        timestamp: DateTime<Utc>,
    },

    /// Acknowledgement to the sender of `start-transmission`
    #[serde(rename_all = "camelCase")]
    TransmissionSent { success: bool, transmission_id: u64 },

    /// The other participant finished a transmission
    TransmissionCompleted {
        sender: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// The other participant reported a transmission failure
    TransmissionFailed {
        sender: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// `start-transmission` was rejected
    TransmissionError { error: String },

    /// Any other rejected request, reported to the originating connection only
    Error { code: String, message: String },

    /// Pong response to ping
    Pong,
}

impl ServerMessage {
    pub fn layer_update_received(update: LayerProgress, timestamp: DateTime<Utc>) -> Self {
        ServerMessage::LayerUpdateReceived {
            layer: update.layer,
            progress: update.progress,
            computer: update.computer,
            phase: update.phase,
            timestamp,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::ComputerJoined(_) => "computer-joined",
            ServerMessage::ComputerLeft(_) => "computer-left",
            ServerMessage::RoomUpdate(_) => "room-update",
            ServerMessage::ReceiveTransmission { .. } => "receive-transmission",
            ServerMessage::LayerUpdateReceived { .. } => "layer-update-received",
            ServerMessage::TransmissionSent { .. } => "transmission-sent",
            ServerMessage::TransmissionCompleted { .. } => "transmission-completed",
            ServerMessage::TransmissionFailed { .. } => "transmission-failed",
            ServerMessage::TransmissionError { .. } => "transmission-error",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong => "pong",
        }
    }
}
