// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-facing WebSocket endpoint.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::connection::protocol::{AgentToServer, ServerToAgent};
use crate::registry::{InstanceId, ReportedState};
use crate::state::FleetState;

/// Queued commands per socket before `deliver` reports the agent backlogged.
const OUTBOUND_CAPACITY: usize = 32;

/// Build the router served on the agent port.
pub fn build_agent_router(state: Arc<FleetState>) -> Router {
    Router::new()
        .route("/v1/opamp", get(agent_ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /v1/opamp`
pub async fn agent_ws_handler(
    State(state): State<Arc<FleetState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent(socket, state))
}

async fn handle_agent(socket: WebSocket, state: Arc<FleetState>) {
    let conn_id = state.hub.next_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerToAgent>(OUTBOUND_CAPACITY);
    tracing::debug!(conn_id, "agent socket opened");

    // Writes go through their own task so a redelivery triggered by the read
    // loop never waits on itself.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(conn_id, err = %e, "failed to encode agent command");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut attached = HashSet::new();
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_agent_message(&state, conn_id, &tx, &mut attached, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_agent_message(&state, conn_id, &tx, &mut attached, text).await,
                        Err(_) => tracing::warn!(conn_id, "non-utf8 agent message skipped"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(conn_id, err = %e, "agent socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    for id in attached {
        if state.hub.detach(&id, conn_id).await {
            tracing::info!(instance_id = %id, conn_id, "agent disconnected");
        }
    }
    drop(tx);
    let _ = writer.await;
}

/// Handle one status report: route the socket, record the report, then
/// resend whatever intent the agent has not applied yet.
async fn handle_agent_message(
    state: &FleetState,
    conn_id: u64,
    tx: &mpsc::Sender<ServerToAgent>,
    attached: &mut HashSet<InstanceId>,
    text: &str,
) {
    let msg: AgentToServer = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(conn_id, err = %e, "malformed agent message skipped");
            return;
        }
    };
    let id = msg.instance_uid;
    let applied_hash = msg.applied_config_hash().map(str::to_owned);

    if state.hub.attach(id, conn_id, tx.clone()).await {
        attached.insert(id);
        tracing::info!(instance_id = %id, conn_id, "agent connected");
    }
    tracing::trace!(instance_id = %id, seq = msg.sequence_num, "agent report");
    state.registry.on_report(id, ReportedState::new(msg.status));

    match state.registry.redeliver_pending(id, applied_hash.as_deref()).await {
        Ok(0) => {}
        Ok(sent) => tracing::debug!(instance_id = %id, sent, "redelivered pending intent"),
        Err(e) => tracing::warn!(instance_id = %id, err = %e, "redelivery failed"),
    }
}
