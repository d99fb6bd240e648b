//! Shared HTTP client construction for the Google backends.

use std::time::Duration;

/// Build the client used for OAuth, Drive and Sheets calls.
///
/// Every remote call carries an explicit timeout.
pub fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cognisight/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Read a non-success response into `(status, body)` for error reporting.
pub(crate) async fn failure(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    (status, body)
}
