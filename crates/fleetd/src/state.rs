// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::certs::CertIssuer;
use crate::config::FleetConfig;
use crate::connection::ConnectionHub;
use crate::registry::{AgentRegistry, Deliver};

/// Shared server state, handed to both the operator and agent routers.
pub struct FleetState {
    pub registry: Arc<AgentRegistry>,
    pub hub: Arc<ConnectionHub>,
    /// `None` when no CA is configured; certificate rotation is then refused.
    pub issuer: Option<Arc<CertIssuer>>,
    pub config: FleetConfig,
    pub shutdown: CancellationToken,
}

impl FleetState {
    pub fn new(
        config: FleetConfig,
        issuer: Option<CertIssuer>,
        shutdown: CancellationToken,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let registry = Arc::new(AgentRegistry::new(
            config.registry_options(),
            Arc::clone(&hub) as Arc<dyn Deliver>,
        ));
        Self { registry, hub, issuer: issuer.map(Arc::new), config, shutdown }
    }
}
