// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleetd: agent fleet management server.
//!
//! Agents connect over a WebSocket and report status; operators inspect the
//! fleet and push configuration or rotated client certificates over HTTP.

pub mod certs;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::certs::CertIssuer;
use crate::config::FleetConfig;
use crate::connection::build_agent_router;
use crate::state::FleetState;
use crate::transport::build_router;

/// Run both listeners until Ctrl-C.
pub async fn run(config: FleetConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let issuer = match (&config.ca_cert, &config.ca_key) {
        (Some(cert), Some(key)) => {
            Some(CertIssuer::from_files(cert, key, config.cert_validity_days)?)
        }
        _ => {
            tracing::warn!("no CA configured, client certificate rotation is disabled");
            None
        }
    };

    let api_addr = config.api_addr();
    let agent_addr = config.agent_addr();
    let state = Arc::new(FleetState::new(config, issuer, shutdown.clone()));

    let api_listener = TcpListener::bind(&api_addr).await?;
    let agent_listener = TcpListener::bind(&agent_addr).await?;
    tracing::info!("fleetd listening on {api_addr} (api), {agent_addr} (agents)");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    serve(state, api_listener, agent_listener).await
}

/// Serve both routers on already-bound listeners until `state.shutdown` is
/// cancelled, then release every outstanding config wait.
pub async fn serve(
    state: Arc<FleetState>,
    api_listener: TcpListener,
    agent_listener: TcpListener,
) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let registry = Arc::clone(&state.registry);

    let api = axum::serve(api_listener, build_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let agents = axum::serve(agent_listener, build_agent_router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    // Pending pushes must not hold the API server's graceful shutdown open.
    tokio::spawn(async move {
        shutdown.cancelled().await;
        registry.shutdown();
    });

    let result = tokio::try_join!(
        async move { api.await.map_err(anyhow::Error::from) },
        async move { agents.await.map_err(anyhow::Error::from) },
    );
    result.map(|_| ())
}
