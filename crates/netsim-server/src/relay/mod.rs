//! Room relay core
//!
//! [`RelayState`] holds the session registry and connection directory. Every
//! inbound event is a state transition over both that yields a list of
//! [`Outbound`] messages; [`RelayHub`] serializes those transitions and hands
//! the results to a [`Broadcast`] implementation.

mod coordinator;
mod directory;
mod hub;
mod registry;
mod room_id;
mod sweeper;

pub use directory::{Binding, ConnectionDirectory};
pub use hub::RelayHub;
pub use registry::{
    validate_display_name, Release, Room, Seat, SessionRegistry, SweepReport, MAX_DISPLAY_NAME_LEN,
    ROOM_CAPACITY,
};
pub use room_id::{RoomId, ROOM_ID_LEN};
pub use sweeper::spawn_sweeper;

use async_trait::async_trait;
use netsim_protocol::ServerMessage;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// A message produced by a state transition, addressed at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Reply to a single connection
    Direct {
        to: ConnectionId,
        message: ServerMessage,
    },
    /// Fan-out to the members of a room, minus `exclude`
    Room {
        members: Vec<ConnectionId>,
        exclude: Option<ConnectionId>,
        message: ServerMessage,
    },
}

impl Outbound {
    pub fn message(&self) -> &ServerMessage {
        match self {
            Outbound::Direct { message, .. } | Outbound::Room { message, .. } => message,
        }
    }

    /// Concrete connections this message will be delivered to
    pub fn recipients(&self) -> Vec<ConnectionId> {
        match self {
            Outbound::Direct { to, .. } => vec![*to],
            Outbound::Room {
                members, exclude, ..
            } => members
                .iter()
                .copied()
                .filter(|m| Some(*m) != *exclude)
                .collect(),
        }
    }
}

/// Delivery contract implemented by the transport
#[async_trait]
pub trait Broadcast: Send + Sync {
    async fn send_to(&self, connection_id: ConnectionId, message: &ServerMessage);

    async fn broadcast(
        &self,
        members: &[ConnectionId],
        exclude: Option<ConnectionId>,
        message: &ServerMessage,
    ) {
        for member in members {
            if Some(*member) != exclude {
                self.send_to(*member, message).await;
            }
        }
    }
}

/// Registry and directory, mutated only through the coordinator operations
#[derive(Debug, Default)]
pub struct RelayState {
    registry: SessionRegistry,
    directory: ConnectionDirectory,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }
}
