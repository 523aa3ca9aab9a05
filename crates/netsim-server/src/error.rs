use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of room and relay operations.
///
/// These are always reported to the originating connection only and never
/// affect other rooms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full (maximum 2 computers)")]
    RoomFull,

    #[error("You are not connected to a valid room")]
    NotInRoom,

    #[error("The name {0} is already in use in this room")]
    NameTaken(String),

    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("Could not allocate a free room id")]
    IdSpaceExhausted,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Event of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl RelayError {
    /// Stable machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::RoomNotFound => "room_not_found",
            RelayError::RoomFull => "room_full",
            RelayError::NotInRoom => "not_in_room",
            RelayError::NameTaken(_) => "name_taken",
            RelayError::InvalidRoomId(_) => "invalid_room_id",
            RelayError::InvalidDisplayName(_) => "invalid_display_name",
            RelayError::IdSpaceExhausted => "id_space_exhausted",
            RelayError::MalformedEvent(_) => "malformed_event",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Relay(e) => {
                let status = match e {
                    RelayError::RoomNotFound => StatusCode::NOT_FOUND,
                    RelayError::RoomFull | RelayError::NameTaken(_) => StatusCode::CONFLICT,
                    RelayError::NotInRoom => StatusCode::FORBIDDEN,
                    RelayError::InvalidRoomId(_)
                    | RelayError::InvalidDisplayName(_)
                    | RelayError::MalformedEvent(_) => StatusCode::BAD_REQUEST,
                    RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    RelayError::IdSpaceExhausted => {
                        tracing::error!("Room id space exhausted");
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, e.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let code = match &self {
            AppError::Relay(e) => e.code(),
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
