use super::room_id::RoomId;
use super::ConnectionId;
use std::collections::HashMap;

/// The room and identity a live connection speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub room_id: RoomId,
    pub display_name: String,
}

/// Maps live connections to their room binding.
///
/// Holds room ids only; rooms themselves belong to the
/// [`SessionRegistry`](super::SessionRegistry). The per-room index keeps
/// member lookups proportional to room size, not to the number of
/// connections on the server.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    bindings: HashMap<ConnectionId, Binding>,
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding, returning whatever was bound before
    pub fn bind(
        &mut self,
        connection: ConnectionId,
        room_id: RoomId,
        display_name: String,
    ) -> Option<Binding> {
        let previous = self.bindings.insert(
            connection,
            Binding {
                room_id: room_id.clone(),
                display_name,
            },
        );
        if let Some(previous) = &previous {
            self.forget(&previous.room_id, connection);
        }
        self.rooms.entry(room_id).or_default().push(connection);
        previous
    }

    pub fn resolve(&self, connection: ConnectionId) -> Option<&Binding> {
        self.bindings.get(&connection)
    }

    pub fn unbind(&mut self, connection: ConnectionId) -> Option<Binding> {
        let binding = self.bindings.remove(&connection)?;
        self.forget(&binding.room_id, connection);
        Some(binding)
    }

    /// Connections currently bound to `room_id`, in binding order
    pub fn members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    fn forget(&mut self, room_id: &RoomId, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.retain(|c| *c != connection);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
