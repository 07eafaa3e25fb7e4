// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam between the registry and whatever carries commands to live agents.

use async_trait::async_trait;

use super::types::{AgentConfigMap, ConnectionSettingsOffer, InstanceId};

/// Operator intent handed to an agent's live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RemoteConfig(AgentConfigMap),
    ConnectionSettings(ConnectionSettingsOffer),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteConfig(_) => "remote_config",
            Self::ConnectionSettings(_) => "connection_settings",
        }
    }
}

/// Why a command could not be handed off.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("agent has no live connection")]
    NotConnected,
    #[error("agent connection closed")]
    ChannelClosed,
    #[error("agent is not accepting commands")]
    Backlogged,
}

/// Carries commands to agents.
///
/// Implementations should hand the command off without waiting on the agent.
/// The registry still bounds every call.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, id: InstanceId, command: Command) -> Result<(), DeliveryError>;
}
