//! Relay coordinator: one state transition per inbound event kind.

use super::directory::Binding;
use super::registry::{validate_display_name, SweepReport};
use super::{ConnectionId, Outbound, RelayState, RoomId};
use crate::error::RelayError;
use chrono::{DateTime, TimeDelta, Utc};
use netsim_protocol::{
    ClientMessage, LayerProgress, PresenceNotice, RoomSnapshot, ServerMessage, TransmissionData,
};
use rand::Rng;

type Transition = Result<Vec<Outbound>, RelayError>;

impl RelayState {
    pub fn create_room<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<RoomId, RelayError> {
        let room_id = self.registry.create_room(rng, now)?;
        tracing::info!("Room {} created", room_id);
        Ok(room_id)
    }

    /// Reserve a seat over the request/response surface
    pub fn join_room(
        &mut self,
        room_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<RoomSnapshot, RelayError> {
        let room_id = RoomId::parse(room_id)?;
        let name = validate_display_name(display_name)?;

        self.registry.join_room(&room_id, &name, now)?;
        tracing::info!("Seat reserved for {} in room {}", name, room_id);

        self.snapshot(&room_id).ok_or(RelayError::RoomNotFound)
    }

    pub fn room_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, RelayError> {
        let room_id = RoomId::parse(room_id)?;
        self.snapshot(&room_id).ok_or(RelayError::RoomNotFound)
    }

    /// Build a snapshot from the directory's current bindings, in seat order
    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let room = self.registry.get(room_id)?;

        let participants = room
            .seats()
            .iter()
            .filter_map(|seat| {
                let binding = self.directory.resolve(seat.connection?)?;
                (&binding.room_id == room_id && binding.display_name == seat.display_name)
                    .then(|| binding.display_name.clone())
            })
            .collect();

        Some(RoomSnapshot {
            room_id: room_id.to_string(),
            participants,
            transmission_count: room.transmission_count(),
            seats: room.seats().len(),
            created_at: room.created_at(),
        })
    }

    /// Apply one inbound event from `connection`.
    ///
    /// Failures never escape: they become a single message back to the sender.
    pub fn dispatch(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        now: DateTime<Utc>,
    ) -> Vec<Outbound> {
        let event = message.event_name();

        let result = match message {
            ClientMessage::JoinRoom {
                room_id,
                display_name,
            } => self.announce_join(connection, &room_id, &display_name, now),
            ClientMessage::RequestRoomInfo { room_id } => {
                self.request_room_info(connection, &room_id)
            }
            ClientMessage::StartTransmission {
                transmission_data,
                target_computer,
            } => {
                return self
                    .start_transmission(connection, transmission_data, &target_computer, now)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Rejected {} from {}: {}", event, connection, e);
                        vec![Outbound::Direct {
                            to: connection,
                            message: ServerMessage::TransmissionError {
                                error: e.to_string(),
                            },
                        }]
                    });
            }
            ClientMessage::LayerUpdate(update) => self.relay_layer_update(connection, update, now),
            ClientMessage::TransmissionComplete { transmission } => {
                self.relay_completion(connection, transmission, now)
            }
            ClientMessage::TransmissionError { error } => {
                self.relay_failure(connection, error, now)
            }
            ClientMessage::LeaveRoom { .. } => Ok(self.leave(connection, now)),
            ClientMessage::Ping => Ok(vec![Outbound::Direct {
                to: connection,
                message: ServerMessage::Pong,
            }]),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Rejected {} from {}: {}", event, connection, e);
            vec![Self::rejection(connection, &e)]
        })
    }

    /// Structured failure addressed to the originating connection only
    pub fn rejection(connection: ConnectionId, error: &RelayError) -> Outbound {
        Outbound::Direct {
            to: connection,
            message: ServerMessage::Error {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        }
    }

    /// Implicit leave for a closed connection
    pub fn disconnect(&mut self, connection: ConnectionId, now: DateTime<Utc>) -> Vec<Outbound> {
        self.leave(connection, now)
    }

    /// Reap stale state, then refresh the snapshot of every surviving room
    /// whose roster changed
    pub fn sweep(
        &mut self,
        now: DateTime<Utc>,
        idle_timeout: TimeDelta,
    ) -> (SweepReport, Vec<Outbound>) {
        let report = self.registry.sweep(now, idle_timeout);
        for room_id in &report.destroyed_rooms {
            tracing::info!("Room {} swept (idle)", room_id);
        }

        let refreshes = report
            .shrunk_rooms
            .iter()
            .filter_map(|room_id| self.room_update(room_id))
            .collect();
        (report, refreshes)
    }

    fn announce_join(
        &mut self,
        connection: ConnectionId,
        room_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Transition {
        let room_id = RoomId::parse(room_id)?;
        let name = validate_display_name(display_name)?;
        self.registry
            .get(&room_id)
            .ok_or(RelayError::RoomNotFound)?;

        let mut out = Vec::new();

        match self.directory.resolve(connection).cloned() {
            Some(previous) if previous.room_id == room_id => {
                if previous.display_name != name {
                    self.registry.rename_seat(&room_id, connection, &name)?;
                    self.directory
                        .bind(connection, room_id.clone(), name.clone());
                    out.push(self.fan_out(
                        &room_id,
                        Some(connection),
                        ServerMessage::ComputerLeft(departure_notice(&previous.display_name, now)),
                    ));
                    out.push(self.fan_out(
                        &room_id,
                        Some(connection),
                        ServerMessage::ComputerJoined(arrival_notice(&name, now)),
                    ));
                }
                out.extend(self.room_update(&room_id));
                return Ok(out);
            }
            Some(_) => {
                // Make sure the new room will accept us before leaving the old one
                self.registry
                    .get(&room_id)
                    .ok_or(RelayError::RoomNotFound)?
                    .check_claim(&name, connection)?;
                out.extend(self.leave(connection, now));
            }
            None => {}
        }

        self.registry.claim_seat(&room_id, &name, connection, now)?;
        self.directory.bind(connection, room_id.clone(), name.clone());
        tracing::info!("Computer {} joined room {}", name, room_id);

        out.push(self.fan_out(
            &room_id,
            Some(connection),
            ServerMessage::ComputerJoined(arrival_notice(&name, now)),
        ));
        out.extend(self.room_update(&room_id));
        Ok(out)
    }

    fn request_room_info(&self, connection: ConnectionId, room_id: &str) -> Transition {
        let binding = self.bound(connection)?;
        let room_id = RoomId::parse(room_id)?;
        if binding.room_id != room_id {
            return Err(RelayError::NotInRoom);
        }

        Ok(self.room_update(&room_id).into_iter().collect())
    }

    fn start_transmission(
        &mut self,
        connection: ConnectionId,
        mut transmission_data: TransmissionData,
        target_computer: &str,
        now: DateTime<Utc>,
    ) -> Transition {
        let sender = self.bound(connection)?;
        let transmission_id = self
            .registry
            .next_transmission_id(&sender.room_id)
            .ok_or(RelayError::RoomNotFound)?;
        transmission_data.transmission_id = Some(transmission_id);

        tracing::info!(
            "Transmission #{} sent from {} to {} in room {} ({:?}, {:?})",
            transmission_id,
            sender.display_name,
            target_computer,
            sender.room_id,
            transmission_data.protocol,
            transmission_data.payload.kind(),
        );

        Ok(vec![
            self.fan_out(
                &sender.room_id,
                Some(connection),
                ServerMessage::ReceiveTransmission {
                    transmission_data,
                    sender: sender.display_name,
                    timestamp: now,
                    transmission_id,
                },
            ),
            Outbound::Direct {
                to: connection,
                message: ServerMessage::TransmissionSent {
                    success: true,
                    transmission_id,
                },
            },
        ])
    }

    fn relay_layer_update(
        &self,
        connection: ConnectionId,
        update: LayerProgress,
        now: DateTime<Utc>,
    ) -> Transition {
        let sender = self.bound(connection)?;
        tracing::debug!(
            "Layer {} at {:.0}% ({:?}) from {} in room {}",
            update.layer,
            update.progress,
            update.phase,
            sender.display_name,
            sender.room_id
        );

        Ok(vec![self.fan_out(
            &sender.room_id,
            Some(connection),
            ServerMessage::layer_update_received(update, now),
        )])
    }

    fn relay_completion(
        &self,
        connection: ConnectionId,
        transmission: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Transition {
        let sender = self.bound(connection)?;
        tracing::info!(
            "Transmission completed by {} in room {}",
            sender.display_name,
            sender.room_id
        );

        Ok(vec![self.fan_out(
            &sender.room_id,
            Some(connection),
            ServerMessage::TransmissionCompleted {
                sender: sender.display_name,
                data: transmission,
                timestamp: now,
            },
        )])
    }

    fn relay_failure(&self, connection: ConnectionId, error: String, now: DateTime<Utc>) -> Transition {
        let sender = self.bound(connection)?;
        tracing::info!(
            "Transmission failed for {} in room {}: {}",
            sender.display_name,
            sender.room_id,
            error
        );

        Ok(vec![self.fan_out(
            &sender.room_id,
            Some(connection),
            ServerMessage::TransmissionFailed {
                sender: sender.display_name,
                error,
                timestamp: now,
            },
        )])
    }

    /// Shared by explicit leave and disconnect. Unbound connections are a no-op.
    fn leave(&mut self, connection: ConnectionId, now: DateTime<Utc>) -> Vec<Outbound> {
        let Some(binding) = self.directory.unbind(connection) else {
            return Vec::new();
        };

        let release = self.registry.release(&binding.room_id, connection);
        tracing::info!(
            "Computer {} left room {}",
            binding.display_name,
            binding.room_id
        );

        if release.room_destroyed {
            return Vec::new();
        }

        let mut out = vec![self.fan_out(
            &binding.room_id,
            None,
            ServerMessage::ComputerLeft(departure_notice(&binding.display_name, now)),
        )];
        out.extend(self.room_update(&binding.room_id));
        out
    }

    fn bound(&self, connection: ConnectionId) -> Result<Binding, RelayError> {
        self.directory
            .resolve(connection)
            .cloned()
            .ok_or(RelayError::NotInRoom)
    }

    fn fan_out(
        &self,
        room_id: &RoomId,
        exclude: Option<ConnectionId>,
        message: ServerMessage,
    ) -> Outbound {
        Outbound::Room {
            members: self.directory.members(room_id),
            exclude,
            message,
        }
    }

    fn room_update(&self, room_id: &RoomId) -> Option<Outbound> {
        let snapshot = self.snapshot(room_id)?;
        Some(self.fan_out(room_id, None, ServerMessage::RoomUpdate(snapshot.into())))
    }
}

fn arrival_notice(name: &str, now: DateTime<Utc>) -> PresenceNotice {
    PresenceNotice {
        computer_name: name.to_string(),
        message: format!("{} joined the room", name),
        timestamp: now,
    }
}

fn departure_notice(name: &str, now: DateTime<Utc>) -> PresenceNotice {
    PresenceNotice {
        computer_name: name.to_string(),
        message: format!("{} has disconnected", name),
        timestamp: now,
    }
}
