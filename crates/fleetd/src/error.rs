// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::certs::CertError;
use crate::registry::RegistryError;

/// Error codes for the operator API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetError {
    BadRequest,
    AgentNotFound,
    DeliveryFailed,
    Internal,
}

impl FleetError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::AgentNotFound => 404,
            Self::DeliveryFailed => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::DeliveryFailed => "DELIVERY_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl From<&RegistryError> for FleetError {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::UnknownAgent(_) => Self::AgentNotFound,
            RegistryError::DeliveryFailed { .. } => Self::DeliveryFailed,
        }
    }
}

impl From<&CertError> for FleetError {
    fn from(_: &CertError) -> Self {
        Self::Internal
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`FleetError`] paired with its message, returned from handlers.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: FleetError,
    pub message: String,
}

impl ApiError {
    pub fn new(code: FleetError, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::new(FleetError::from(&err), err.to_string())
    }
}

impl From<CertError> for ApiError {
    fn from(err: CertError) -> Self {
        Self::new(FleetError::from(&err), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.code.to_http_response(self.message).into_response()
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
