use super::registry::SweepReport;
use super::{Broadcast, ConnectionId, Outbound, RelayState, RoomId};
use crate::error::RelayError;
use chrono::{TimeDelta, Utc};
use netsim_protocol::{ClientMessage, RoomSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Process-scoped relay: one lock around all room state, plus the transport
/// used to deliver whatever a transition produces.
pub struct RelayHub {
    state: Mutex<RelayState>,
    outlet: Arc<dyn Broadcast>,
}

impl RelayHub {
    pub fn new(outlet: Arc<dyn Broadcast>) -> Self {
        Self {
            state: Mutex::new(RelayState::new()),
            outlet,
        }
    }

    pub async fn create_room(&self) -> Result<RoomId, RelayError> {
        let mut state = self.state.lock().await;
        state.create_room(&mut rand::thread_rng(), Utc::now())
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        display_name: &str,
    ) -> Result<RoomSnapshot, RelayError> {
        self.state
            .lock()
            .await
            .join_room(room_id, display_name, Utc::now())
    }

    pub async fn room_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, RelayError> {
        self.state.lock().await.room_snapshot(room_id)
    }

    /// Apply an inbound event and deliver the results
    pub async fn handle(&self, connection: ConnectionId, message: ClientMessage) {
        let outbound = {
            let mut state = self.state.lock().await;
            state.dispatch(connection, message, Utc::now())
        };
        self.deliver(outbound).await;
    }

    /// Implicit leave for a closed connection
    pub async fn disconnect(&self, connection: ConnectionId) {
        let outbound = {
            let mut state = self.state.lock().await;
            state.disconnect(connection, Utc::now())
        };
        self.deliver(outbound).await;
    }

    /// Report a failure that happened before dispatch (e.g. an unparseable frame)
    pub async fn reject(&self, connection: ConnectionId, error: RelayError) {
        self.deliver(vec![RelayState::rejection(connection, &error)])
            .await;
    }

    pub async fn sweep(&self, idle_timeout: Duration) -> SweepReport {
        let idle_timeout = TimeDelta::from_std(idle_timeout).unwrap_or(TimeDelta::MAX);
        let (report, outbound) = {
            let mut state = self.state.lock().await;
            state.sweep(Utc::now(), idle_timeout)
        };
        self.deliver(outbound).await;
        report
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.registry().len()
    }

    async fn deliver(&self, outbound: Vec<Outbound>) {
        for item in outbound {
            match item {
                Outbound::Direct { to, message } => self.outlet.send_to(to, &message).await,
                Outbound::Room {
                    members,
                    exclude,
                    message,
                } => {
                    tracing::debug!(
                        "Fanning out {} to {} member(s)",
                        message.event_name(),
                        members.iter().filter(|m| Some(**m) != exclude).count()
                    );
                    self.outlet.broadcast(&members, exclude, &message).await
                }
            }
        }
    }
}
