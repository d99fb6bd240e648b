use crate::controller::SubmitError;
use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cognisight_store::LedgerError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP handlers, rendered as
/// `{"error": {"code", "message"}}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or invalid admin token")]
    Unauthorized,
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("malformed form data: {0}")]
    Multipart(#[from] MultipartError),
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Multipart(e) => e.status(),
            ApiError::Ledger(_) => StatusCode::BAD_GATEWAY,
            ApiError::Submit(e) => match e {
                SubmitError::InvalidEmail | SubmitError::MissingImage => StatusCode::BAD_REQUEST,
                SubmitError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                SubmitError::Engine(EngineError::Preprocess(_)) => StatusCode::UNPROCESSABLE_ENTITY,
                SubmitError::Engine(EngineError::Classifier(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                SubmitError::Engine(EngineError::ChannelClosed | EngineError::Spawn(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SubmitError::Upload(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Multipart(_) => "invalid_form",
            ApiError::Ledger(_) => "ledger_unavailable",
            ApiError::Submit(e) => match e {
                SubmitError::InvalidEmail => "invalid_email",
                SubmitError::MissingImage => "missing_image",
                SubmitError::UnsupportedFormat(_) => "unsupported_format",
                SubmitError::Engine(EngineError::Preprocess(_)) => "undecodable_image",
                SubmitError::Engine(EngineError::Classifier(_)) => "inference_failed",
                SubmitError::Engine(_) => "engine_unavailable",
                SubmitError::Upload(_) => "upload_failed",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cognisight_core::{ClassifierError, PreprocessError};
    use cognisight_store::UploadError;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "invalid_input"),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
            (SubmitError::InvalidEmail.into(), StatusCode::BAD_REQUEST, "invalid_email"),
            (SubmitError::MissingImage.into(), StatusCode::BAD_REQUEST, "missing_image"),
            (
                SubmitError::UnsupportedFormat("gif".into()).into(),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
            ),
            (
                SubmitError::Engine(EngineError::Preprocess(PreprocessError::Empty)).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "undecodable_image",
            ),
            (
                SubmitError::Engine(EngineError::Classifier(ClassifierError::InvalidOutput(f32::NAN)))
                    .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "inference_failed",
            ),
            (
                SubmitError::Engine(EngineError::ChannelClosed).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "engine_unavailable",
            ),
            (
                SubmitError::Upload(UploadError::MissingId).into(),
                StatusCode::BAD_GATEWAY,
                "upload_failed",
            ),
            (
                ApiError::Ledger(LedgerError::InvalidUrl("x".into())),
                StatusCode::BAD_GATEWAY,
                "ledger_unavailable",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }
}
