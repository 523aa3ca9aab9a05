use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use netsim_protocol::{CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, RoomSnapshot};

pub async fn create_room(State(state): State<AppState>) -> Result<Json<CreateRoomResponse>> {
    let room_id = state.relay.create_room().await?;

    Ok(Json(CreateRoomResponse {
        room_id: room_id.to_string(),
        success: true,
    }))
}

/// Reserve a seat. The caller still has to announce itself on the WebSocket.
pub async fn join_room(
    State(state): State<AppState>,
    payload: std::result::Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<Json<JoinRoomResponse>> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let room = state
        .relay
        .join_room(&input.room_id, &input.display_name)
        .await?;

    Ok(Json(JoinRoomResponse {
        success: true,
        room: Some(room),
        error: None,
    }))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>> {
    let snapshot = state.relay.room_snapshot(&room_id).await?;
    Ok(Json(snapshot))
}
