// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON handlers for the operator API.

use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::certs::CertError;
use crate::connection::AgentConnection;
use crate::error::{ApiError, FleetError};
use crate::registry::types::epoch_ms;
use crate::registry::{
    AgentConfigMap, AgentRecord, ConnectionSettingsOffer, InstanceId, OfferOutcome, PushOutcome,
};
use crate::state::FleetState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_count: usize,
    pub connected_count: usize,
}

/// Offer as shown to operators. The private key never leaves the server
/// over this API.
#[derive(Debug, Clone, Serialize)]
pub struct OfferSummary {
    pub sha256_fingerprint: String,
    pub issued_at_ms: u64,
}

impl From<&ConnectionSettingsOffer> for OfferSummary {
    fn from(offer: &ConnectionSettingsOffer) -> Self {
        Self {
            sha256_fingerprint: offer.certificate.sha256_fingerprint.clone(),
            issued_at_ms: offer.issued_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub instance_id: InstanceId,
    pub connected: bool,
    /// When the current socket was routed to this agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since_ms: Option<u64>,
    pub reported_state: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_config: Option<AgentConfigMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_config_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_connection_offer: Option<OfferSummary>,
    pub report_seq: u64,
    pub first_seen_ms: u64,
    pub last_report_ms: u64,
}

impl AgentView {
    pub fn from_record(record: AgentRecord, connection: Option<&AgentConnection>) -> Self {
        Self {
            instance_id: record.instance_id,
            connected: connection.is_some(),
            connected_since_ms: connection.map(|c| c.connected_at_ms),
            reported_state: record.reported_state.into_value(),
            pending_config_hash: record.pending_config.as_ref().map(AgentConfigMap::config_hash),
            pending_config: record.pending_config,
            pending_connection_offer: record.pending_connection_offer.as_ref().map(Into::into),
            report_seq: record.report_seq,
            first_seen_ms: record.first_seen_ms,
            last_report_ms: record.last_report_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PushConfigRequest {
    pub config: String,
}

#[derive(Debug, Serialize)]
pub struct PushConfigResponse {
    pub instance_id: InstanceId,
    pub outcome: PushOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SaveConfigForm {
    pub instanceid: String,
    #[serde(default)]
    pub config: String,
}

#[derive(Debug, Deserialize)]
pub struct RotateCertForm {
    pub instanceid: String,
}

#[derive(Debug, Serialize)]
pub struct RotateCertResponse {
    pub instance_id: InstanceId,
    pub outcome: OfferOutcome,
    pub sha256_fingerprint: String,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<FleetState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        agent_count: s.registry.agent_count(),
        connected_count: s.hub.connected_count().await,
    })
}

/// `GET /api/agents`
pub async fn list_agents(State(s): State<Arc<FleetState>>) -> impl IntoResponse {
    let records = s.registry.list_agents();
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        let connection = s.hub.connection(&record.instance_id).await;
        views.push(AgentView::from_record(record, connection.as_ref()));
    }
    Json(views)
}

/// `GET /api/agent/{id}`
pub async fn get_agent(
    State(s): State<Arc<FleetState>>,
    Path(id): Path<String>,
) -> Result<Json<AgentView>, ApiError> {
    let id = parse_instance_id(&id)?;
    let record = s
        .registry
        .get_agent(&id)
        .ok_or_else(|| ApiError::new(FleetError::AgentNotFound, format!("unknown agent {id}")))?;
    let connection = s.hub.connection(&id).await;
    Ok(Json(AgentView::from_record(record, connection.as_ref())))
}

/// `POST /api/agent/{id}/config`
pub async fn push_config(
    State(s): State<Arc<FleetState>>,
    Path(id): Path<String>,
    Json(req): Json<PushConfigRequest>,
) -> Result<Json<PushConfigResponse>, ApiError> {
    let id = parse_instance_id(&id)?;
    let outcome = push_config_body(&s, id, req.config).await?;
    Ok(Json(PushConfigResponse { instance_id: id, outcome }))
}

/// `POST /api/save_config`
pub async fn save_config(
    State(s): State<Arc<FleetState>>,
    Form(form): Form<SaveConfigForm>,
) -> Result<Json<PushConfigResponse>, ApiError> {
    let id = parse_instance_id(&form.instanceid)?;
    let outcome = push_config_body(&s, id, form.config).await?;
    Ok(Json(PushConfigResponse { instance_id: id, outcome }))
}

/// `POST /api/rotate_client_cert`
pub async fn rotate_client_cert(
    State(s): State<Arc<FleetState>>,
    Form(form): Form<RotateCertForm>,
) -> Result<Json<RotateCertResponse>, ApiError> {
    let id = parse_instance_id(&form.instanceid)?;
    let (outcome, offer) = rotate_cert(&s, id).await?;
    Ok(Json(RotateCertResponse {
        instance_id: id,
        outcome,
        sha256_fingerprint: offer.certificate.sha256_fingerprint,
    }))
}

// -- Shared with the form handlers --------------------------------------------

pub(crate) fn parse_instance_id(raw: &str) -> Result<InstanceId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::new(FleetError::BadRequest, format!("invalid instance id: {e}")))
}

/// Push a single-file config body and wait for the agent's next report.
pub(crate) async fn push_config_body(
    s: &FleetState,
    id: InstanceId,
    body: String,
) -> Result<PushOutcome, ApiError> {
    let config = AgentConfigMap::from_body(body);
    Ok(s.registry.push_custom_config_default(id, config).await?)
}

/// Issue a fresh client certificate for a known agent and offer it.
///
/// On [`FleetError::DeliveryFailed`] the offer stays pending and goes out on
/// the agent's next report.
pub(crate) async fn rotate_cert(
    s: &FleetState,
    id: InstanceId,
) -> Result<(OfferOutcome, ConnectionSettingsOffer), ApiError> {
    if s.registry.get_agent(&id).is_none() {
        return Err(ApiError::new(FleetError::AgentNotFound, format!("unknown agent {id}")));
    }
    let issuer = s.issuer.as_ref().ok_or(CertError::NotConfigured)?;
    let certificate = issuer.issue_client_cert(&id)?;
    let offer = ConnectionSettingsOffer { certificate, issued_at_ms: epoch_ms() };
    let outcome = s.registry.offer_connection_settings(id, offer.clone()).await?;
    Ok((outcome, offer))
}
