//! Mapping pipeline failures to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::pipeline::{PipelineError, Stage};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: Stage,
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        if self.source.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            warn!(stage = %self.stage, error = %self.source, "Rejected upload");
        } else {
            error!(stage = %self.stage, error = %self.source, "Pipeline failed");
        }

        let body = ErrorBody {
            error: self.source.to_string(),
            stage: self.stage,
        };
        (status, Json(body)).into_response()
    }
}
