//! Tenant-scoped fan-out of live events to dashboard sockets.
//!
//! A single actor task owns the client set. Handles talk to it over a
//! bounded command queue, so publishing never waits on a socket.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::web::models::websocket_models::WsMessage;

pub const DEFAULT_CLIENT_BUFFER: usize = 256;
const DEFAULT_COMMAND_BUFFER: usize = 1024;

pub type ClientId = u64;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
    #[error("hub command queue is full")]
    Busy,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Outbound messages buffered per client before it is evicted.
    pub client_buffer: usize,
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_buffer: DEFAULT_CLIENT_BUFFER,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Outbound side of one registered client. The receiver yields `None`
/// once the client is unregistered or evicted.
#[derive(Debug)]
pub struct ClientSubscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

enum HubCommand {
    Register {
        tenant_id: Uuid,
        reply: oneshot::Sender<ClientSubscription>,
    },
    Unregister {
        client_id: ClientId,
    },
    Publish {
        tenant_id: Uuid,
        payload: Arc<str>,
    },
    ClientCount {
        tenant_id: Option<Uuid>,
        reply: oneshot::Sender<usize>,
    },
}

struct Client {
    tenant_id: Uuid,
    sender: mpsc::Sender<Arc<str>>,
}

struct HubActor {
    commands: mpsc::Receiver<HubCommand>,
    clients: HashMap<ClientId, Client>,
    next_id: ClientId,
    client_buffer: usize,
}

impl HubActor {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!(clients = self.clients.len(), "Broadcast hub stopped.");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { tenant_id, reply } => {
                self.next_id += 1;
                let id = self.next_id;
                let (sender, receiver) = mpsc::channel(self.client_buffer);
                self.clients.insert(id, Client { tenant_id, sender });
                if reply.send(ClientSubscription { id, receiver }).is_err() {
                    // Caller went away before the reply arrived.
                    self.clients.remove(&id);
                    return;
                }
                info!(client_id = id, %tenant_id, total = self.clients.len(), "Client registered.");
            }
            HubCommand::Unregister { client_id } => {
                if let Some(client) = self.clients.remove(&client_id) {
                    info!(client_id, tenant_id = %client.tenant_id, total = self.clients.len(), "Client unregistered.");
                }
            }
            HubCommand::Publish { tenant_id, payload } => self.fan_out(tenant_id, payload),
            HubCommand::ClientCount { tenant_id, reply } => {
                let count = match tenant_id {
                    Some(tenant_id) => self.clients.values().filter(|c| c.tenant_id == tenant_id).count(),
                    None => self.clients.len(),
                };
                let _ = reply.send(count);
            }
        }
    }

    fn fan_out(&mut self, tenant_id: Uuid, payload: Arc<str>) {
        let mut evicted = Vec::new();
        for (id, client) in self.clients.iter().filter(|(_, c)| c.tenant_id == tenant_id) {
            if let Err(e) = client.sender.try_send(Arc::clone(&payload)) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "connection closed",
                };
                warn!(client_id = *id, %tenant_id, reason, "Evicting websocket client.");
                evicted.push(*id);
            }
        }
        for id in evicted {
            self.clients.remove(&id);
        }
    }
}

/// Cheap, cloneable handle to the hub actor. The actor stops once every
/// handle is dropped.
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawns the actor on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> Self {
        let (commands, receiver) = mpsc::channel(config.command_buffer.max(1));
        let actor = HubActor {
            commands: receiver,
            clients: HashMap::new(),
            next_id: 0,
            client_buffer: config.client_buffer.max(1),
        };
        tokio::spawn(actor.run());
        Self { commands }
    }

    pub async fn register(&self, tenant_id: Uuid) -> Result<ClientSubscription, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HubCommand::Register { tenant_id, reply })
            .await
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }

    pub async fn unregister(&self, client_id: ClientId) {
        if self
            .commands
            .send(HubCommand::Unregister { client_id })
            .await
            .is_err()
        {
            debug!(client_id, "Hub already stopped, nothing to unregister.");
        }
    }

    /// Serialises once and queues the message without waiting. Fails when
    /// the command queue is full or the hub is gone.
    pub fn publish(&self, tenant_id: Uuid, message: &WsMessage) -> Result<(), HubError> {
        let payload: Arc<str> = serde_json::to_string(message)?.into();
        self.commands
            .try_send(HubCommand::Publish { tenant_id, payload })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HubError::Busy,
                mpsc::error::TrySendError::Closed(_) => HubError::Closed,
            })
    }

    /// Number of registered clients, optionally for one tenant. Processed
    /// in order with other commands.
    pub async fn client_count(&self, tenant_id: Option<Uuid>) -> Result<usize, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HubCommand::ClientCount { tenant_id, reply })
            .await
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::alert;
    use crate::db::enums::{AlertStatus, AlertType};
    use chrono::Utc;

    fn alert_for(tenant_id: Uuid) -> WsMessage {
        let now = Utc::now();
        WsMessage::Alert(alert::Model {
            id: Uuid::new_v4(),
            tenant_id,
            driver_id: Uuid::new_v4(),
            shift_id: None,
            alert_type: AlertType::DriverOffline,
            status: AlertStatus::Triggered,
            stop_latitude: None,
            stop_longitude: None,
            stop_duration_seconds: 0,
            nearest_zone_id: None,
            nearest_zone_distance_meters: None,
            manager_notes: None,
            triggered_at: now,
            notified_at: Some(now),
            acknowledged_at: None,
            resolved_at: None,
            created_at: now,
        })
    }

    #[tokio::test]
    async fn test_messages_stay_within_tenant() {
        let hub = HubHandle::spawn(HubConfig::default());
        let (tenant_a, tenant_b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a = hub.register(tenant_a).await.unwrap();
        let mut b = hub.register(tenant_b).await.unwrap();

        hub.publish(tenant_a, &alert_for(tenant_a)).unwrap();
        assert_eq!(hub.client_count(None).await.unwrap(), 2);

        let payload = a.receiver.recv().await.unwrap();
        let decoded: WsMessage = serde_json::from_str(&payload).unwrap();
        assert!(matches!(decoded, WsMessage::Alert(ref al) if al.tenant_id == tenant_a));
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_client_is_evicted() {
        let hub = HubHandle::spawn(HubConfig { client_buffer: 2, ..HubConfig::default() });
        let tenant = Uuid::new_v4();
        let mut slow = hub.register(tenant).await.unwrap();
        let mut fast = hub.register(tenant).await.unwrap();

        for _ in 0..2 {
            hub.publish(tenant, &alert_for(tenant)).unwrap();
        }
        // Keep the fast client drained.
        fast.receiver.recv().await.unwrap();
        fast.receiver.recv().await.unwrap();
        hub.publish(tenant, &alert_for(tenant)).unwrap();

        assert_eq!(hub.client_count(Some(tenant)).await.unwrap(), 1);
        assert!(fast.receiver.recv().await.is_some());

        // The slow client keeps what was buffered, then sees the close.
        assert!(slow.receiver.recv().await.is_some());
        assert!(slow.receiver.recv().await.is_some());
        assert!(slow.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_closes_outbound_channel() {
        let hub = HubHandle::spawn(HubConfig::default());
        let tenant = Uuid::new_v4();
        let mut sub = hub.register(tenant).await.unwrap();
        hub.unregister(sub.id).await;
        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(hub.client_count(Some(tenant)).await.unwrap(), 0);
        // Publishing to a tenant without clients is fine.
        hub.publish(tenant, &alert_for(tenant)).unwrap();
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_evicted_on_publish() {
        let hub = HubHandle::spawn(HubConfig::default());
        let tenant = Uuid::new_v4();
        let sub = hub.register(tenant).await.unwrap();
        drop(sub);
        hub.publish(tenant, &alert_for(tenant)).unwrap();
        assert_eq!(hub.client_count(None).await.unwrap(), 0);
    }
}
