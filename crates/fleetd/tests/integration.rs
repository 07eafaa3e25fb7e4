// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests: real agent WebSocket connections against a served
//! fleetd, driven through the operator API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use fleetd::config::FleetConfig;
use fleetd::connection::ServerToAgent;
use fleetd::registry::InstanceId;
use fleetd::state::FleetState;
use fleetd::transport::build_router;

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Fleet {
    state: Arc<FleetState>,
    api: TestServer,
    agent_addr: SocketAddr,
    served: JoinHandle<anyhow::Result<()>>,
}

impl Fleet {
    async fn start() -> anyhow::Result<Self> {
        let config = FleetConfig::parse_from([
            "fleetd",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--agent-port",
            "0",
            "--ack-timeout-ms",
            "2000",
        ]);
        let state = Arc::new(FleetState::new(config, None, CancellationToken::new()));
        let api_listener = TcpListener::bind("127.0.0.1:0").await?;
        let agent_listener = TcpListener::bind("127.0.0.1:0").await?;
        let agent_addr = agent_listener.local_addr()?;
        let served = tokio::spawn(fleetd::serve(Arc::clone(&state), api_listener, agent_listener));
        let api = TestServer::new(build_router(Arc::clone(&state)))?;
        Ok(Self { state, api, agent_addr, served })
    }

    async fn connect(&self) -> anyhow::Result<AgentSocket> {
        let url = format!("ws://{}/v1/opamp", self.agent_addr);
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        Ok(socket)
    }

    async fn stop(self) -> anyhow::Result<()> {
        self.state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.served).await???;
        Ok(())
    }
}

async fn report(
    socket: &mut AgentSocket,
    id: InstanceId,
    seq: u64,
    applied_hash: Option<&str>,
) -> anyhow::Result<()> {
    let mut status = json!({ "health": { "healthy": true }, "seq_seen": seq });
    if let Some(hash) = applied_hash {
        status["remote_config_status"] = json!({ "last_remote_config_hash": hash });
    }
    let msg = json!({ "instance_uid": id.to_string(), "sequence_num": seq, "status": status });
    socket.send(Message::text(msg.to_string())).await?;
    Ok(())
}

async fn next_command(socket: &mut AgentSocket) -> anyhow::Result<ServerToAgent> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
        if msg.is_text() {
            return Ok(serde_json::from_str(msg.to_text()?)?);
        }
    }
}

/// Poll until `check` holds or a few seconds pass.
async fn eventually<F, Fut>(mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("condition not reached")
}

#[tokio::test]
async fn pushed_config_is_acknowledged_by_agent_report() -> anyhow::Result<()> {
    let fleet = Fleet::start().await?;
    let state = &fleet.state;
    let id = InstanceId::new_v4();
    let mut agent = fleet.connect().await?;

    report(&mut agent, id, 1, None).await?;
    eventually(move || async move { state.registry.get_agent(&id).is_some() }).await?;

    let push = async {
        fleet
            .api
            .post(&format!("/api/agent/{id}/config"))
            .json(&json!({ "config": "receivers:\n  otlp: {}\n" }))
            .await
    };
    let agent_side = async {
        let command = next_command(&mut agent).await?;
        assert_eq!(command.instance_uid, id);
        let remote = command.remote_config.ok_or_else(|| anyhow::anyhow!("no remote_config"))?;
        assert_eq!(remote.config.config_map[""].body, "receivers:\n  otlp: {}\n");
        report(&mut agent, id, 2, Some(&remote.config_hash)).await?;
        anyhow::Ok(remote.config_hash)
    };
    let (resp, applied) = tokio::join!(push, agent_side);
    let applied = applied?;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["outcome"], "acknowledged");

    let record = state.registry.get_agent(&id).ok_or_else(|| anyhow::anyhow!("gone"))?;
    assert_eq!(record.report_seq, 2);
    assert_eq!(
        record.reported_state.as_value()["remote_config_status"]["last_remote_config_hash"],
        applied.as_str()
    );

    fleet.stop().await
}

#[tokio::test]
async fn malformed_message_does_not_drop_connection() -> anyhow::Result<()> {
    let fleet = Fleet::start().await?;
    let state = &fleet.state;
    let id = InstanceId::new_v4();
    let mut agent = fleet.connect().await?;

    agent.send(Message::text("{not json")).await?;
    agent.send(Message::text(json!({ "instance_uid": "nope" }).to_string())).await?;
    report(&mut agent, id, 1, None).await?;

    eventually(move || async move { state.registry.agent_count() == 1 }).await?;
    assert!(state.hub.is_connected(&id).await);

    fleet.stop().await
}

#[tokio::test]
async fn disconnect_detaches_but_keeps_record() -> anyhow::Result<()> {
    let fleet = Fleet::start().await?;
    let state = &fleet.state;
    let id = InstanceId::new_v4();
    let mut agent = fleet.connect().await?;

    report(&mut agent, id, 1, None).await?;
    eventually(move || async move { state.hub.is_connected(&id).await }).await?;

    agent.close(None).await?;
    drop(agent);
    eventually(move || async move { !state.hub.is_connected(&id).await }).await?;

    let resp = fleet.api.get(&format!("/api/agent/{id}")).await;
    resp.assert_status_ok();
    let view: serde_json::Value = resp.json();
    assert_eq!(view["connected"], false);

    fleet.stop().await
}

#[tokio::test]
async fn pending_config_is_redelivered_until_applied() -> anyhow::Result<()> {
    let fleet = Fleet::start().await?;
    let state = &fleet.state;
    let id = InstanceId::new_v4();

    // Agent reports once, then goes away before the operator pushes.
    let mut first = fleet.connect().await?;
    report(&mut first, id, 1, None).await?;
    eventually(move || async move { state.hub.is_connected(&id).await }).await?;
    first.close(None).await?;
    drop(first);
    eventually(move || async move { !state.hub.is_connected(&id).await }).await?;

    let resp = fleet
        .api
        .post(&format!("/api/agent/{id}/config"))
        .json(&json!({ "config": "exporters: {}" }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_GATEWAY);

    // On reconnect the stored config goes out with the first report.
    let mut second = fleet.connect().await?;
    report(&mut second, id, 2, None).await?;
    let command = next_command(&mut second).await?;
    let remote = command.remote_config.ok_or_else(|| anyhow::anyhow!("no remote_config"))?;
    assert_eq!(remote.config.config_map[""].body, "exporters: {}");

    // Once applied it is not sent again.
    report(&mut second, id, 3, Some(&remote.config_hash)).await?;
    let quiet = tokio::time::timeout(Duration::from_millis(300), second.next()).await;
    assert!(quiet.is_err(), "unexpected message after applying config");

    fleet.stop().await
}

#[tokio::test]
async fn shutdown_closes_agent_sockets() -> anyhow::Result<()> {
    let fleet = Fleet::start().await?;
    let state = &fleet.state;
    let id = InstanceId::new_v4();
    let mut agent = fleet.connect().await?;
    report(&mut agent, id, 1, None).await?;
    eventually(move || async move { state.hub.is_connected(&id).await }).await?;

    fleet.stop().await?;

    // The server side closes; the stream ends with a close frame or EOF.
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = agent.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok());
    Ok(())
}
