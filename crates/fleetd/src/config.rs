// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::registry::{RegistryOptions, ReportMerge};

/// Configuration for the fleetd server.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleetd", version, about = "Agent fleet management server")]
pub struct FleetConfig {
    /// Host to bind both listeners on.
    #[arg(long, default_value = "0.0.0.0", env = "FLEETD_HOST")]
    pub host: String,

    /// Port for the operator HTTP API and dashboard.
    #[arg(long, default_value_t = 4321, env = "FLEETD_PORT")]
    pub port: u16,

    /// Port for the agent WebSocket endpoint (`/v1/opamp`).
    #[arg(long, default_value_t = 4320, env = "FLEETD_AGENT_PORT")]
    pub agent_port: u16,

    /// How long a config push waits for the agent's next report, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "FLEETD_ACK_TIMEOUT_MS")]
    pub ack_timeout_ms: u64,

    /// How a new report combines with the stored state.
    #[arg(long, value_enum, default_value_t = ReportMerge::Replace, env = "FLEETD_REPORT_MERGE")]
    pub report_merge: ReportMerge,

    /// PEM CA certificate used to sign agent client certificates.
    #[arg(long, env = "FLEETD_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// PEM private key for `--ca-cert`.
    #[arg(long, env = "FLEETD_CA_KEY")]
    pub ca_key: Option<PathBuf>,

    /// Validity of issued client certificates, in days.
    #[arg(long, default_value_t = 365, env = "FLEETD_CERT_VALIDITY_DAYS")]
    pub cert_validity_days: u32,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, default_value = "info", env = "FLEETD_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text", env = "FLEETD_LOG_FORMAT")]
    pub log_format: String,
}

impl FleetConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ack_timeout_ms == 0 {
            anyhow::bail!("--ack-timeout-ms must be greater than zero");
        }
        if self.ca_cert.is_some() != self.ca_key.is_some() {
            anyhow::bail!("--ca-cert and --ca-key must be given together");
        }
        if self.cert_validity_days == 0 {
            anyhow::bail!("--cert-validity-days must be greater than zero");
        }
        if self.port != 0 && self.port == self.agent_port {
            anyhow::bail!("--port and --agent-port must differ");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("unknown --log-format {other:?} (expected text or json)"),
        }
        Ok(())
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn agent_addr(&self) -> String {
        format!("{}:{}", self.host, self.agent_port)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions { ack_timeout: self.ack_timeout(), report_merge: self.report_merge }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
