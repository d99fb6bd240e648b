use axum::response::{Html, IntoResponse};

/// The screening form. Single static page; all state lives in the browser
/// until Predict posts the form.
pub async fn index_handler() -> impl IntoResponse {
    Html(include_str!("../../templates/index.html"))
}
