// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Value types held by the agent registry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier for one agent connection lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(uuid::Uuid);

impl InstanceId {
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Opaque status last reported by an agent.
///
/// The registry never looks inside; only the connection layer interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportedState(serde_json::Value);

impl ReportedState {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Merge the top-level keys of `next` over this state.
    ///
    /// Falls back to a wholesale replace unless both sides are JSON objects.
    pub fn overlay(&mut self, next: ReportedState) {
        match (&mut self.0, next.0) {
            (serde_json::Value::Object(current), serde_json::Value::Object(incoming)) => {
                for (key, value) in incoming {
                    current.insert(key, value);
                }
            }
            (slot, incoming) => *slot = incoming,
        }
    }
}

/// One named configuration file pushed to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfigFile {
    pub body: String,
    #[serde(default)]
    pub content_type: String,
}

/// Custom configuration assigned by an operator, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfigMap {
    pub config_map: BTreeMap<String, AgentConfigFile>,
}

impl AgentConfigMap {
    /// Build a single-file config stored under the unnamed (`""`) entry.
    pub fn from_body(body: impl Into<String>) -> Self {
        let mut config_map = BTreeMap::new();
        config_map.insert(
            String::new(),
            AgentConfigFile { body: body.into(), content_type: "text/yaml".to_owned() },
        );
        Self { config_map }
    }

    /// Hex SHA-256 over every entry in name order.
    pub fn config_hash(&self) -> String {
        let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
        for (name, file) in &self.config_map {
            ctx.update(name.as_bytes());
            ctx.update(&[0]);
            ctx.update(file.content_type.as_bytes());
            ctx.update(&[0]);
            ctx.update(file.body.as_bytes());
            ctx.update(&[0]);
        }
        hex::encode(ctx.finish())
    }
}

/// A freshly issued client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCertificate {
    pub cert_pem: String,
    pub private_key_pem: String,
    pub ca_cert_pem: String,
    pub sha256_fingerprint: String,
}

/// Proposal for how an agent should connect going forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettingsOffer {
    pub certificate: TlsCertificate,
    pub issued_at_ms: u64,
}

/// Last-known state of one agent plus pending operator intent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub instance_id: InstanceId,
    pub reported_state: ReportedState,
    pub pending_config: Option<AgentConfigMap>,
    pub pending_connection_offer: Option<ConnectionSettingsOffer>,
    /// Number of reports applied to this record.
    pub report_seq: u64,
    pub first_seen_ms: u64,
    pub last_report_ms: u64,
}

impl AgentRecord {
    pub(crate) fn from_first_report(
        instance_id: InstanceId,
        reported_state: ReportedState,
        now_ms: u64,
    ) -> Self {
        Self {
            instance_id,
            reported_state,
            pending_config: None,
            pending_connection_offer: None,
            report_seq: 1,
            first_seen_ms: now_ms,
            last_report_ms: now_ms,
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
