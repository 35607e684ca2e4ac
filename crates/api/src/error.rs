use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vanlav_core::{ForecastError, IngestError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("forecast did not finish within {0} seconds")]
    Timeout(u64),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Forecast(_) | ApiError::MissingField(_) | ApiError::InvalidField { .. } | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Forecast(e) => e.kind(),
            ApiError::MissingField(_) => "missing_field",
            ApiError::InvalidField { .. } => "invalid_field",
            ApiError::Multipart(_) => "invalid_multipart",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        match &self {
            ApiError::Forecast(ForecastError::Ingest(e)) => {
                body["file"] = json!(e.file());
                if let IngestError::SchemaMismatch {
                    column,
                    malformed,
                    total,
                    ..
                } = e
                {
                    body["column"] = json!(column);
                    body["malformed_rows"] = json!(malformed);
                    body["total_rows"] = json!(total);
                }
            }
            ApiError::Forecast(ForecastError::InvalidRequest { field, .. }) => body["field"] = json!(field),
            ApiError::MissingField(field) | ApiError::InvalidField { field, .. } => body["field"] = json!(field),
            ApiError::Internal(e) => {
                sentry_anyhow::capture_anyhow(e);
                tracing::error!(error = %format!("{e:#}"), "request failed");
            }
            _ => {}
        }

        if status.is_client_error() {
            tracing::info!(kind = self.kind(), error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}
