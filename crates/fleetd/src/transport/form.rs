// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard form posts. Each applies the change like its `/api` twin and
//! then sends the browser back to the agent page.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::response::Redirect;

use crate::error::{ApiError, FleetError};
use crate::registry::{InstanceId, WaitResult};
use crate::state::FleetState;
use crate::transport::http::{
    parse_instance_id, push_config_body, rotate_cert, RotateCertForm, SaveConfigForm,
};

fn agent_page(id: InstanceId) -> Redirect {
    Redirect::to(&format!("/agent?instanceid={id}"))
}

/// Intent that failed to reach the agent is still stored and goes out on
/// its next report, so the page is shown either way.
fn tolerate_undelivered(result: Result<(), ApiError>, id: InstanceId) -> Result<(), ApiError> {
    match result {
        Err(e) if e.code == FleetError::DeliveryFailed => {
            tracing::warn!(instance_id = %id, err = %e.message, "change stored but not delivered");
            Ok(())
        }
        other => other,
    }
}

/// `POST /save_config`
pub async fn save_config(
    State(s): State<Arc<FleetState>>,
    Form(form): Form<SaveConfigForm>,
) -> Result<Redirect, ApiError> {
    let id = parse_instance_id(&form.instanceid)?;
    let result = push_config_body(&s, id, form.config).await.map(|_| ());
    tolerate_undelivered(result, id)?;
    Ok(agent_page(id))
}

/// `POST /rotate_client_cert`
///
/// Gives the agent up to the acknowledgment timeout to report back under
/// its new certificate, so the page it lands on is current.
pub async fn rotate_client_cert(
    State(s): State<Arc<FleetState>>,
    Form(form): Form<RotateCertForm>,
) -> Result<Redirect, ApiError> {
    let id = parse_instance_id(&form.instanceid)?;
    let next_report = s.registry.watch_next_report(id)?;
    let result = rotate_cert(&s, id).await.map(|_| ());
    tolerate_undelivered(result, id)?;

    match next_report.wait(s.registry.ack_timeout()).await {
        WaitResult::Notified => tracing::debug!(instance_id = %id, "agent reported after rotation"),
        WaitResult::TimedOut | WaitResult::Closed => {
            tracing::info!(instance_id = %id, "no report after rotation before the timeout");
        }
    }
    Ok(agent_page(id))
}
