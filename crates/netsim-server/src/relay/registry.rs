//! Session registry and room lifecycle
//!
//! The registry exclusively owns every [`Room`]. Rooms are created empty,
//! hold at most [`ROOM_CAPACITY`] seats, and are destroyed as soon as their
//! last seat is released.

use super::room_id::RoomId;
use super::ConnectionId;
use crate::error::RelayError;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::collections::HashMap;

pub const ROOM_CAPACITY: usize = 2;
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Attempts at drawing an unused room id before giving up
const MAX_ID_ATTEMPTS: usize = 32;

/// One entry in a room's roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub display_name: String,
    /// Connection currently holding the seat. `None` while reserved over HTTP only.
    pub connection: Option<ConnectionId>,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    seats: Vec<Seat>,
    created_at: DateTime<Utc>,
    transmission_count: u64,
}

impl Room {
    fn new(id: RoomId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            seats: Vec::with_capacity(ROOM_CAPACITY),
            created_at: now,
            transmission_count: 0,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn transmission_count(&self) -> u64 {
        self.transmission_count
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= ROOM_CAPACITY
    }

    fn seat(&self, display_name: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.display_name == display_name)
    }

    /// Whether `connection` may take the seat named `display_name`
    pub fn check_claim(
        &self,
        display_name: &str,
        connection: ConnectionId,
    ) -> Result<(), RelayError> {
        match self.seat(display_name) {
            Some(Seat {
                connection: Some(holder),
                ..
            }) if *holder != connection => Err(RelayError::NameTaken(display_name.to_string())),
            Some(_) => Ok(()),
            None if self.is_full() => Err(RelayError::RoomFull),
            None => Ok(()),
        }
    }

    /// Reserve a seat without a connection. An existing unbound seat with the
    /// same name is reused.
    fn reserve(&mut self, display_name: &str, now: DateTime<Utc>) -> Result<(), RelayError> {
        match self.seat(display_name) {
            Some(Seat {
                connection: Some(_),
                ..
            }) => Err(RelayError::NameTaken(display_name.to_string())),
            Some(_) => Ok(()),
            None if self.is_full() => Err(RelayError::RoomFull),
            None => {
                self.seats.push(Seat {
                    display_name: display_name.to_string(),
                    connection: None,
                    reserved_at: now,
                });
                Ok(())
            }
        }
    }

    /// Bind `connection` to the seat named `display_name`, reserving it first if needed
    fn claim(
        &mut self,
        display_name: &str,
        connection: ConnectionId,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        self.check_claim(display_name, connection)?;

        match self.seats.iter_mut().find(|s| s.display_name == display_name) {
            Some(seat) => seat.connection = Some(connection),
            None => self.seats.push(Seat {
                display_name: display_name.to_string(),
                connection: Some(connection),
                reserved_at: now,
            }),
        }
        Ok(())
    }

    fn release(&mut self, connection: ConnectionId) -> Option<Seat> {
        let pos = self
            .seats
            .iter()
            .position(|s| s.connection == Some(connection))?;
        Some(self.seats.remove(pos))
    }

    fn rename(&mut self, connection: ConnectionId, display_name: &str) -> Result<(), RelayError> {
        if self
            .seats
            .iter()
            .any(|s| s.display_name == display_name && s.connection != Some(connection))
        {
            return Err(RelayError::NameTaken(display_name.to_string()));
        }

        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.connection == Some(connection))
            .ok_or(RelayError::NotInRoom)?;
        seat.display_name = display_name.to_string();
        Ok(())
    }
}

/// Trim and check a participant name
pub fn validate_display_name(input: &str) -> Result<String, RelayError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(RelayError::InvalidDisplayName("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(RelayError::InvalidDisplayName(format!(
            "name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Outcome of releasing a connection's seat
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Release {
    pub seat: Option<Seat>,
    pub room_destroyed: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dropped_seats: usize,
    pub destroyed_rooms: Vec<RoomId>,
    /// Rooms that lost a stale seat but are still alive
    pub shrunk_rooms: Vec<RoomId>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn create_room<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<RoomId, RelayError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = RoomId::generate(rng);
            if !self.rooms.contains_key(&id) {
                self.rooms.insert(id.clone(), Room::new(id.clone(), now));
                return Ok(id);
            }
        }
        Err(RelayError::IdSpaceExhausted)
    }

    /// Reserve a seat in an existing room
    pub fn join_room(
        &mut self,
        room_id: &RoomId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<&Room, RelayError> {
        let room = self.rooms.get_mut(room_id).ok_or(RelayError::RoomNotFound)?;
        room.reserve(display_name, now)?;
        Ok(room)
    }

    pub fn claim_seat(
        &mut self,
        room_id: &RoomId,
        display_name: &str,
        connection: ConnectionId,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        self.rooms
            .get_mut(room_id)
            .ok_or(RelayError::RoomNotFound)?
            .claim(display_name, connection, now)
    }

    pub fn rename_seat(
        &mut self,
        room_id: &RoomId,
        connection: ConnectionId,
        display_name: &str,
    ) -> Result<(), RelayError> {
        self.rooms
            .get_mut(room_id)
            .ok_or(RelayError::RoomNotFound)?
            .rename(connection, display_name)
    }

    /// Remove the seat held by `connection`; destroys the room if that was the
    /// last seat. Unknown rooms and connections are a no-op.
    pub fn release(&mut self, room_id: &RoomId, connection: ConnectionId) -> Release {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Release::default();
        };

        let seat = room.release(connection);
        let room_destroyed = seat.is_some() && room.seats.is_empty();
        if room_destroyed {
            self.rooms.remove(room_id);
            tracing::info!("Room {} destroyed (empty)", room_id);
        }

        Release {
            seat,
            room_destroyed,
        }
    }

    /// Bump the room's counter and return the new transmission id
    pub fn next_transmission_id(&mut self, room_id: &RoomId) -> Option<u64> {
        let room = self.rooms.get_mut(room_id)?;
        room.transmission_count += 1;
        Some(room.transmission_count)
    }

    /// Drop seats reserved longer than `idle_timeout` without a connection, then
    /// destroy rooms left empty for that long. Rooms with a bound seat are kept.
    pub fn sweep(&mut self, now: DateTime<Utc>, idle_timeout: TimeDelta) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, room) in self.rooms.iter_mut() {
            let before = room.seats.len();
            room.seats
                .retain(|s| s.connection.is_some() || now - s.reserved_at < idle_timeout);
            let dropped = before - room.seats.len();
            if dropped > 0 && !room.seats.is_empty() {
                report.shrunk_rooms.push(id.clone());
            }
            report.dropped_seats += dropped;
        }

        self.rooms.retain(|id, room| {
            let expired = room.seats.is_empty() && now - room.created_at >= idle_timeout;
            if expired {
                report.destroyed_rooms.push(id.clone());
            }
            !expired
        });
        report.destroyed_rooms.sort();
        report.shrunk_rooms.sort();

        report
    }
}
