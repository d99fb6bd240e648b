//! Photo upload to a Google Drive folder.

use crate::auth::{AuthError, TokenProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("drive rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("drive response carried no file id")]
    MissingId,
    #[error("invalid object name: {0}")]
    InvalidName(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for submitted photos. Returns a shareable link per object.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend_tag(&self) -> &'static str;

    async fn put(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: Option<String>,
    web_view_link: Option<String>,
}

/// Drive v3 uploader targeting one parent folder.
pub struct DriveImageStore {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    folder_id: String,
    base_url: String,
}

impl DriveImageStore {
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenProvider>, folder_id: impl Into<String>) -> Self {
        Self {
            client,
            tokens,
            folder_id: folder_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }
}

/// Assemble a `multipart/related` body: JSON metadata part, then media part.
fn related_body(boundary: &str, metadata: &serde_json::Value, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl ImageStore for DriveImageStore {
    fn backend_tag(&self) -> &'static str {
        "drive"
    }

    async fn put(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let token = self.tokens.access_token().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [self.folder_id],
        });
        let boundary = format!("cognisight-{}", uuid::Uuid::new_v4().simple());
        let body = related_body(&boundary, &metadata, content_type, bytes);

        let resp = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.base_url))
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,webViewLink"),
                ("supportsAllDrives", "true"),
            ])
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::failure(resp).await;
            return Err(UploadError::Rejected { status, body });
        }

        let file: DriveFile = resp.json().await?;
        let id = file.id.ok_or(UploadError::MissingId)?;
        let link = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{id}/view"));

        tracing::info!(file_id = %id, name, size = bytes.len(), "photo uploaded to drive");
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::test_support::serve;
    use axum::body::Bytes;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Captured {
        content_type: String,
        authorization: String,
        query: HashMap<String, String>,
        body: Vec<u8>,
    }

    struct FakeDrive {
        captured: Mutex<Captured>,
        status: StatusCode,
        response: serde_json::Value,
    }

    async fn upload(
        State(state): State<Arc<FakeDrive>>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let header = |k: &str| {
            headers
                .get(k)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        *state.captured.lock().await = Captured {
            content_type: header("content-type"),
            authorization: header("authorization"),
            query,
            body: body.to_vec(),
        };
        (state.status, Json(state.response.clone()))
    }

    async fn fake(status: StatusCode, response: serde_json::Value) -> (Arc<FakeDrive>, DriveImageStore) {
        let state = Arc::new(FakeDrive {
            captured: Mutex::new(Captured::default()),
            status,
            response,
        });
        let app = Router::new()
            .route("/upload/drive/v3/files", post(upload))
            .with_state(state.clone());
        let base = serve(app).await;
        let store = DriveImageStore::new(
            crate::http::client(Duration::from_secs(5)),
            Arc::new(StaticToken("t0k".into())),
            "folder-123",
        )
        .with_base_url(base);
        (state, store)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_upload_sends_related_body_and_returns_link() {
        let (state, store) = fake(
            StatusCode::OK,
            serde_json::json!({"id": "abc", "webViewLink": "https://drive.google.com/file/d/abc/view?usp=drivesdk"}),
        )
        .await;

        let photo = b"\x89PNG\r\n\x1a\nfake-bytes".to_vec();
        let link = store.put("photo.png", "image/png", &photo).await.unwrap();
        assert_eq!(link, "https://drive.google.com/file/d/abc/view?usp=drivesdk");

        let captured = state.captured.lock().await;
        assert!(captured.content_type.starts_with("multipart/related; boundary="));
        assert_eq!(captured.authorization, "Bearer t0k");
        assert_eq!(captured.query.get("uploadType").map(String::as_str), Some("multipart"));
        assert!(contains(&captured.body, b"\"parents\":[\"folder-123\"]"));
        assert!(contains(&captured.body, b"\"name\":\"photo.png\""));
        assert!(contains(&captured.body, b"Content-Type: image/png"));
        assert!(contains(&captured.body, &photo));
    }

    #[tokio::test]
    async fn test_missing_link_falls_back_to_file_url() {
        let (_, store) = fake(StatusCode::OK, serde_json::json!({"id": "xyz"})).await;
        let link = store.put("a.jpg", "image/jpeg", b"jpeg").await.unwrap();
        assert_eq!(link, "https://drive.google.com/file/d/xyz/view");
    }

    #[tokio::test]
    async fn test_rejected_upload_propagates() {
        let (_, store) = fake(
            StatusCode::FORBIDDEN,
            serde_json::json!({"error": {"message": "insufficient permissions"}}),
        )
        .await;
        let err = store.put("a.jpg", "image/jpeg", b"jpeg").await.err().unwrap();
        match err {
            UploadError::Rejected { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("insufficient permissions"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_response_without_id() {
        let (_, store) = fake(StatusCode::OK, serde_json::json!({})).await;
        let err = store.put("a.jpg", "image/jpeg", b"jpeg").await.err().unwrap();
        assert!(matches!(err, UploadError::MissingId));
    }
}
