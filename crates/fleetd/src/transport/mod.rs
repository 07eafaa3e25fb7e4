// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing HTTP transport: JSON API, form posts, and the dashboard.

pub mod form;
pub mod http;

use std::sync::Arc;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::FleetState;

/// Embedded dashboard HTML.
const DASHBOARD_HTML: &str = include_str!("../web/dashboard.html");

/// Build the axum `Router` with all operator routes.
pub fn build_router(state: Arc<FleetState>) -> Router {
    Router::new()
        .route("/api/health", get(http::health))
        // Agents
        .route("/api/agents", get(http::list_agents))
        .route("/api/agent/{id}", get(http::get_agent))
        .route("/api/agent/{id}/config", post(http::push_config))
        .route("/api/save_config", post(http::save_config))
        .route("/api/rotate_client_cert", post(http::rotate_client_cert))
        // Dashboard
        .route("/save_config", post(form::save_config))
        .route("/rotate_client_cert", post(form::rotate_client_cert))
        .route("/", get(|| async { Html(DASHBOARD_HTML) }))
        .route("/agent", get(|| async { Html(DASHBOARD_HTML) }))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
