use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::Error;
use crate::gateway::GatewayError;

/// An [`Error`] rendered as `{"error": ..., "kind": ...}` with a matching status.
///
/// Internal failures are logged in full and reported to the client as a
/// generic message.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Structural { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Closed(_) | Error::Duplicate(_) => StatusCode::CONFLICT,
            Error::Gateway(GatewayError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            Error::Configuration(_) | Error::Database(_) | Error::Csv(_) | Error::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            Error::Configuration(_) => "configuration",
            Error::Structural { .. } => "structural",
            Error::Validation(_) => "validation",
            Error::Gateway(e) => e.kind(),
            Error::NotFound(_) => "not_found",
            Error::Closed(_) => "closed",
            Error::Duplicate(_) => "duplicate",
            Error::Database(_) | Error::Csv(_) | Error::Json(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {}", self.0);
            "Internal server error".to_string()
        } else {
            if status.is_server_error() {
                tracing::warn!("Gateway error: {}", self.0);
            } else {
                tracing::debug!("Request rejected: {}", self.0);
            }
            self.0.to_string()
        };

        let mut body = json!({ "error": message, "kind": kind });
        if let Error::Structural { section, .. } = &self.0 {
            body["section"] = json!(section);
        }

        (status, Json(body)).into_response()
    }
}
