use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::controller::{FormState, Outcome};
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap};
use axum::response::Json;
use cognisight_core::{InputMode, LedgerRow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub mode: InputMode,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub has_image: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub mode: InputMode,
    pub state: FormState,
    pub message: &'static str,
    pub can_predict: bool,
}

/// Pre-prediction form state for one branch. Lets the page enable the
/// Predict button with the same email rule the server enforces.
pub async fn validate_handler(Json(req): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let state = FormState::evaluate(&req.email, req.has_image);
    Json(ValidateResponse {
        mode: req.mode,
        state,
        message: state.message(),
        can_predict: state.can_predict(),
    })
}

/// Fields collected from the `multipart/form-data` submission.
#[derive(Default)]
struct PredictForm {
    mode: Option<String>,
    email: String,
    image: Option<Vec<u8>>,
    filename: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<PredictForm> {
    let mut form = PredictForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => form.mode = Some(field.text().await?),
            "email" => form.email = field.text().await?,
            "image" => {
                form.filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                form.image = (!bytes.is_empty()).then(|| bytes.to_vec());
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown form field");
            }
        }
    }
    Ok(form)
}

/// Run the full submission: classify, upload the photo, append the ledger row.
pub async fn predict_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Outcome>> {
    let form = read_form(multipart).await?;
    let mode: InputMode = form
        .mode
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing form field 'mode'".to_string()))?
        .parse()
        .map_err(ApiError::BadRequest)?;

    tracing::info!(
        mode = %mode,
        has_image = form.image.is_some(),
        filename = form.filename.as_deref().unwrap_or(""),
        "prediction requested"
    );

    let outcome = state
        .controller
        .submit(mode, &form.email, form.image, form.filename.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub backend: &'static str,
    pub count: usize,
    pub rows: Vec<LedgerRow>,
}

/// True when `headers` carry `Authorization: Bearer <expected>`.
fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

/// Current ledger contents, oldest first. Only routed when an admin token is
/// configured, and only answered for requests bearing it.
pub async fn ledger_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<LedgerResponse>> {
    let authorized = state
        .admin_token
        .as_deref()
        .is_some_and(|expected| bearer_matches(&headers, expected));
    if !authorized {
        return Err(ApiError::Unauthorized);
    }
    let ledger = state.controller.ledger();
    let rows = ledger.read_rows().await?;
    Ok(Json(LedgerResponse {
        backend: ledger.backend_tag(),
        count: rows.len(),
        rows,
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model_path,
        "image_store": state.controller.images().backend_tag(),
        "ledger": state.controller.ledger().backend_tag(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_matches() {
        let mut headers = HeaderMap::new();
        assert!(!bearer_matches(&headers, "s3cret"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(bearer_matches(&headers, "s3cret"));
        assert!(!bearer_matches(&headers, "other"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        assert!(!bearer_matches(&headers, "s3cret"));
    }
}
