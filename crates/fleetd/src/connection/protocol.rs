// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON messages exchanged with agents over `/v1/opamp`.

use serde::{Deserialize, Serialize};

use crate::registry::{AgentConfigMap, Command, ConnectionSettingsOffer, InstanceId};

/// Status report sent by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentToServer {
    pub instance_uid: InstanceId,
    #[serde(default)]
    pub sequence_num: u64,
    /// Opaque agent status. Stored as the agent's reported state.
    #[serde(default)]
    pub status: serde_json::Value,
}

impl AgentToServer {
    /// Hash of the remote config the agent says it last applied
    /// (`status.remote_config_status.last_remote_config_hash`).
    pub fn applied_config_hash(&self) -> Option<&str> {
        self.status
            .get("remote_config_status")
            .and_then(|s| s.get("last_remote_config_hash"))
            .and_then(|h| h.as_str())
    }
}

/// Remote config as sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub config: AgentConfigMap,
    pub config_hash: String,
}

/// Command sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerToAgent {
    pub instance_uid: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_config: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_settings: Option<ConnectionSettingsOffer>,
}

impl ServerToAgent {
    pub fn from_command(instance_uid: InstanceId, command: Command) -> Self {
        match command {
            Command::RemoteConfig(config) => Self {
                instance_uid,
                remote_config: Some(RemoteConfig { config_hash: config.config_hash(), config }),
                connection_settings: None,
            },
            Command::ConnectionSettings(offer) => {
                Self { instance_uid, remote_config: None, connection_settings: Some(offer) }
            }
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
