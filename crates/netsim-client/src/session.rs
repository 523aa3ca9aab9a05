use netsim_protocol::{ClientMessage, ServerMessage, TransmissionData};
use rand::Rng;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};
use crate::simulation::{Simulator, describe_payload};

/// Whether the event loop should keep going after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Error codes that mean the join itself was refused
const FATAL_CODES: &[&str] = &[
    "room_not_found",
    "room_full",
    "name_taken",
    "invalid_room_id",
    "invalid_display_name",
];

/// One participant's view of a room, driven by server events
pub struct Session<R> {
    name: String,
    room_id: String,
    peers: Vec<String>,
    outgoing: Option<TransmissionData>,
    exit_after_send: bool,
    received: Vec<TransmissionData>,
    outbox: mpsc::Sender<ClientMessage>,
    simulator: Simulator<R>,
}

impl<R: Rng> Session<R> {
    pub fn new(
        name: &str,
        room_id: &str,
        outbox: mpsc::Sender<ClientMessage>,
        simulator: Simulator<R>,
    ) -> Self {
        Self {
            name: name.to_string(),
            room_id: room_id.to_string(),
            peers: Vec::new(),
            outgoing: None,
            exit_after_send: false,
            received: Vec::new(),
            outbox,
            simulator,
        }
    }

    /// Queue a transmission for the first peer that shows up
    pub fn with_outgoing(mut self, data: TransmissionData, exit_after_send: bool) -> Self {
        self.outgoing = Some(data);
        self.exit_after_send = exit_after_send;
        self
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn received(&self) -> &[TransmissionData] {
        &self.received
    }

    /// Announce on the socket, then react to events until the server goes
    /// away, a fatal refusal arrives, or `shutdown` resolves.
    pub async fn run(
        mut self,
        mut incoming: mpsc::Receiver<ServerMessage>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        self.send(ClientMessage::JoinRoom {
            room_id: self.room_id.clone(),
            display_name: self.name.clone(),
        })
        .await?;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                message = incoming.recv() => {
                    let Some(message) = message else {
                        tracing::info!("Connection closed by server");
                        return Ok(());
                    };
                    if self.handle(message).await? == Flow::Stop {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Leaving room {}", self.room_id);
                    break;
                }
            }
        }

        self.send(ClientMessage::LeaveRoom {
            room_id: Some(self.room_id.clone()),
        })
        .await
    }

    pub async fn handle(&mut self, message: ServerMessage) -> Result<Flow> {
        match message {
            ServerMessage::ComputerJoined(notice) => {
                tracing::info!("{}", notice.message);
            }
            ServerMessage::ComputerLeft(notice) => {
                tracing::info!("{}", notice.message);
                self.peers.retain(|p| p != &notice.computer_name);
            }
            ServerMessage::RoomUpdate(update) => {
                tracing::info!(
                    "Room {}: {} connected, {} transmissions",
                    update.room_id,
                    update.computers.len(),
                    update.room_data.transmission_count
                );
                self.peers = update
                    .computers
                    .into_iter()
                    .filter(|c| c != &self.name)
                    .collect();
                return self.send_pending().await;
            }
            ServerMessage::ReceiveTransmission {
                transmission_data,
                sender,
                transmission_id,
                ..
            } => {
                tracing::info!("Receiving transmission #{} from {}", transmission_id, sender);
                self.simulator.decapsulate().await?;
                tracing::info!(
                    "Received from {}: {}",
                    sender,
                    describe_payload(&transmission_data.payload)
                );
                self.received.push(transmission_data);
            }
            ServerMessage::LayerUpdateReceived {
                layer,
                progress,
                computer,
                phase,
                ..
            } => {
                tracing::debug!("{} {:?} layer {}: {:.0}%", computer, phase, layer, progress);
            }
            ServerMessage::TransmissionSent {
                success,
                transmission_id,
            } => {
                tracing::info!("Transmission #{} acknowledged (success: {})", transmission_id, success);
            }
            ServerMessage::TransmissionCompleted { sender, .. } => {
                tracing::info!("{} finished transmitting", sender);
            }
            ServerMessage::TransmissionFailed { sender, error, .. } => {
                tracing::warn!("{} reported a failed transmission: {}", sender, error);
            }
            ServerMessage::TransmissionError { error } => {
                tracing::warn!("Transmission rejected: {}", error);
            }
            ServerMessage::Error { code, message } => {
                if FATAL_CODES.contains(&code.as_str()) {
                    return Err(ClientError::Refused { code, message });
                }
                tracing::warn!("Relay error ({}): {}", code, message);
            }
            ServerMessage::Pong => {
                tracing::debug!("Pong");
            }
        }

        Ok(Flow::Continue)
    }

    async fn send_pending(&mut self) -> Result<Flow> {
        let Some(target) = self.peers.first().cloned() else {
            return Ok(Flow::Continue);
        };
        let Some(data) = self.outgoing.take() else {
            return Ok(Flow::Continue);
        };

        let outcome = self.simulator.transmit(data, &target).await?;
        if outcome.corrupted {
            tracing::warn!("Transmission delivered with errors");
        }

        Ok(if self.exit_after_send {
            Flow::Stop
        } else {
            Flow::Continue
        })
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        self.outbox
            .send(message)
            .await
            .map_err(|_| ClientError::Closed)
    }
}
