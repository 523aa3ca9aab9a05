use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport mode chosen by the sender of a transmission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    /// Reliable mode: simulated transport errors are retried
    #[default]
    Tcp,
    /// Unreliable mode: simulated transport errors are reported, never retried
    Udp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Text,
    Media,
}

/// Content carried by a transmission. The relay never looks inside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Media {
        name: String,
        media_type: String,
        size: u64,
        /// Base64-encoded file contents
        data: String,
    },
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text { .. } => PayloadKind::Text,
            Payload::Media { .. } => PayloadKind::Media,
        }
    }
}

/// One simulated data-transfer unit, as produced by the sending client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionData {
    /// Client-side display hint. The server-assigned `transmission_id` is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub protocol: TransportProtocol,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Stamped by the relay from the room's transmission counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_id: Option<u64>,
    /// Any other fields the sender attached, relayed untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Direction of the simulated OSI walk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayerPhase {
    Encapsulation,
    Decapsulation,
}

/// Layer progress as reported by a client. Ranges are not validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerProgress {
    pub layer: i64,
    pub progress: f64,
    pub computer: String,
    #[serde(rename = "type")]
    pub phase: LayerPhase,
}

/// Read-only view of a room, recomputed on every request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    /// Display names of the connections currently bound to the room, in seat order
    pub participants: Vec<String>,
    pub transmission_count: u64,
    /// Seats reserved in the roster, bound or not
    pub seats: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub created_at: DateTime<Utc>,
    pub transmission_count: u64,
    pub seats: usize,
}

/// Payload of the `room-update` push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdate {
    pub computers: Vec<String>,
    pub room_id: String,
    pub room_data: RoomData,
}

impl From<RoomSnapshot> for RoomUpdate {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            computers: snapshot.participants,
            room_id: snapshot.room_id,
            room_data: RoomData {
                created_at: snapshot.created_at,
                transmission_count: snapshot.transmission_count,
                seats: snapshot.seats,
            },
        }
    }
}

/// Payload of `computer-joined` / `computer-left`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub computer_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// HTTP request/response bodies

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
    #[serde(alias = "computerName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
