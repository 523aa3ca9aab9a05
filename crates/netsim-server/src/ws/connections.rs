use crate::relay::{Broadcast, ConnectionId};
use async_trait::async_trait;
use netsim_protocol::ServerMessage;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Outbound queues for every open WebSocket
pub struct ConnectionManager {
    /// Map from connection ID to message sender channel
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<String>,
    ) {
        self.senders.write().await.insert(connection_id, sender);
        tracing::debug!("Connection {} opened", connection_id);
    }

    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        if self.senders.write().await.remove(&connection_id).is_some() {
            tracing::debug!("Connection {} closed", connection_id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    fn serialize(message: &ServerMessage) -> Option<String> {
        match serde_json::to_string(message) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", message.event_name(), e);
                None
            }
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcast for ConnectionManager {
    async fn send_to(&self, connection_id: ConnectionId, message: &ServerMessage) {
        let Some(json) = Self::serialize(message) else {
            return;
        };

        let senders = self.senders.read().await;
        match senders.get(&connection_id) {
            Some(sender) => {
                if let Err(e) = sender.send(json) {
                    tracing::error!("Failed to send message to {}: {}", connection_id, e);
                }
            }
            // Gone already: delivery is at-most-once, nothing is queued
            None => tracing::debug!(
                "Dropping {} for closed connection {}",
                message.event_name(),
                connection_id
            ),
        }
    }

    async fn broadcast(
        &self,
        members: &[ConnectionId],
        exclude: Option<ConnectionId>,
        message: &ServerMessage,
    ) {
        let Some(json) = Self::serialize(message) else {
            return;
        };

        let senders = self.senders.read().await;
        for conn_id in members.iter().filter(|m| Some(**m) != exclude) {
            if let Some(sender) = senders.get(conn_id) {
                if let Err(e) = sender.send(json.clone()) {
                    tracing::error!("Failed to send message to {}: {}", conn_id, e);
                }
            }
        }
    }
}
