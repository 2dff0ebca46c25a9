//! Mapping of HTTP failures onto service errors.

use daybreak_generation::ServiceError;
use reqwest::StatusCode;

/// Connection failures and timeouts are worth retrying; anything else that
/// breaks before a response arrives is not.
pub(crate) fn send_error(e: &reqwest::Error) -> ServiceError {
    if e.is_connect() || e.is_timeout() {
        ServiceError::Transient(e.to_string())
    } else {
        ServiceError::Permanent(e.to_string())
    }
}

/// Maps a non-success status: 408, 429 and 5xx are transient.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ServiceError {
    let detail = format!("http {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ServiceError::Transient(detail)
    } else {
        ServiceError::Permanent(detail)
    }
}

/// Sends `request` and decodes a JSON body of type `T`.
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ServiceError> {
    let response = request.send().await.map_err(|e| send_error(&e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| ServiceError::Permanent(format!("malformed response body: {e}")))
}
