// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::connection::protocol::ServerToAgent;
use crate::registry::types::epoch_ms;
use crate::registry::{Command, Deliver, DeliveryError, InstanceId};

/// Outbound half of one agent socket.
#[derive(Debug, Clone)]
pub struct AgentConnection {
    pub conn_id: u64,
    pub tx: mpsc::Sender<ServerToAgent>,
    pub connected_at_ms: u64,
}

/// Live connections keyed by instance id. At most one per agent; a
/// reconnect replaces the previous entry.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<InstanceId, AgentConnection>>,
    next_conn_id: AtomicU64,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a newly accepted socket.
    pub fn next_connection_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Route commands for `id` to `tx`. Returns `true` when this changed
    /// the routing (new agent or a different socket).
    pub async fn attach(
        &self,
        id: InstanceId,
        conn_id: u64,
        tx: mpsc::Sender<ServerToAgent>,
    ) -> bool {
        let mut connections = self.connections.write().await;
        if connections.get(&id).is_some_and(|c| c.conn_id == conn_id) {
            return false;
        }
        connections.insert(id, AgentConnection { conn_id, tx, connected_at_ms: epoch_ms() });
        true
    }

    /// Remove the route for `id` if it still belongs to `conn_id`.
    pub async fn detach(&self, id: &InstanceId, conn_id: u64) -> bool {
        let mut connections = self.connections.write().await;
        if connections.get(id).is_some_and(|c| c.conn_id == conn_id) {
            connections.remove(id);
            return true;
        }
        false
    }

    pub async fn is_connected(&self, id: &InstanceId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn connected_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connection(&self, id: &InstanceId) -> Option<AgentConnection> {
        self.connections.read().await.get(id).cloned()
    }
}

#[async_trait]
impl Deliver for ConnectionHub {
    async fn deliver(&self, id: InstanceId, command: Command) -> Result<(), DeliveryError> {
        // Clone the sender so the lock is not held across the send.
        let tx = {
            let connections = self.connections.read().await;
            connections.get(&id).map(|c| c.tx.clone()).ok_or(DeliveryError::NotConnected)?
        };
        // A socket that stopped draining its queue must not stall the caller.
        tx.try_send(ServerToAgent::from_command(id, command)).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Closed(_) => DeliveryError::ChannelClosed,
        })
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
